//! Discovery domain actions
//!
//! Business logic for the discovery run engine:
//! - `run_discovery`: run controller (trigger, execute, stop conditions, terminal status)
//! - `channel_executor`: bounded, failure-isolated channel queries
//! - `dedup`: canonical identities and the in-run index
//! - `materialize`: results -> Company/Contact/Lead rows, idempotently
//! - `lifecycle`: cancel, archive, unarchive, delete, materialize

pub mod channel_executor;
pub mod dedup;
pub mod lifecycle;
pub mod materialize;
pub mod run_discovery;

pub use lifecycle::{
    archive_run, archive_runs, delete_run, delete_runs, get_run, list_runs, materialize_run,
    request_cancel, unarchive_run, unarchive_runs, BulkFailure, BulkOutcome,
    MATERIALIZE_CLAIM_TIMEOUT,
};
pub use materialize::{materialize_results, MaterializeMode};
pub use run_discovery::{execute_run, trigger_run, RunRequest};
