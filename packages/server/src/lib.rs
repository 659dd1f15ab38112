// Lead Discovery - API Core
//
// This crate provides the discovery run engine of the lead-generation CRM:
// bounded multi-channel search runs, deduplication against existing records,
// and the run lifecycle (preview -> materialize -> archive -> delete).
// Services are exposed through Restate.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
