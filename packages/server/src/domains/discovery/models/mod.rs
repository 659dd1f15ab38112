//! Discovery domain models.

pub mod discovery_intent;
pub mod discovery_result;
pub mod discovery_run;
pub mod run_stats;

pub use discovery_intent::*;
pub use discovery_result::*;
pub use discovery_run::*;
pub use run_stats::*;
