//! Contacts domain - people attached to companies

pub mod models;

pub use models::{Contact, CreateContact};
