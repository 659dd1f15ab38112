//! Companies domain - durable company records

pub mod models;

pub use models::{Company, CreateCompany};
