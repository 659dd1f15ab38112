//! Discovery domain services

pub mod services;

pub use services::*;
