//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod pg_stores;
pub mod scheduled_tasks;
pub mod tavily_client;
pub mod test_dependencies;
pub mod traits;

pub use deps::{ChannelRegistry, RunnerConfig, ServerDeps};
pub use pg_stores::{PgIntentStore, PgRecordStore, PgRunStore};
pub use tavily_client::{TavilyChannel, WEB_SEARCH_CHANNEL};
pub use test_dependencies::{
    MemoryIntentStore, MemoryRecordStore, MemoryRunStore, MockChannel, MockReply,
    TestDependencies,
};
pub use traits::*;
