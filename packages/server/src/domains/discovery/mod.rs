//! Discovery domain - bounded, auditable search-and-import runs

pub mod activities;
pub mod errors;
pub mod models;
pub mod restate;

// Re-export actions
pub use activities::{trigger_run, RunRequest};
pub use errors::DiscoveryError;

// Re-export models
pub use models::{DiscoveryIntent, DiscoveryResult, DiscoveryRun, RunStatus};
