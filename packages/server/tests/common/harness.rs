//! Test harness for integration testing.
//!
//! Every test gets its own in-memory run, record and intent stores plus a
//! channel registry, wired into `ServerDeps` the same way the server wires
//! the Postgres stores.

use std::sync::Arc;
use std::time::Duration;

use leadgen_core::common::DiscoveryRunId;
use leadgen_core::domains::discovery::models::{DiscoveryIntent, DiscoveryRun};
use leadgen_core::kernel::{BaseDiscoveryChannel, ServerDeps, TestDependencies};
use test_context::AsyncTestContext;

/// Test harness that manages test infrastructure.
///
/// # Example using test-context
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &mut TestHarness) {
///     ctx.register(Arc::new(MockChannel::new("web_search")));
///     let deps = ctx.server_deps();
///     // ... test code
/// }
/// ```
pub struct TestHarness {
    pub deps: TestDependencies,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new()
    }

    async fn teardown(self) {
        // In-memory stores are dropped with the harness
    }
}

impl TestHarness {
    pub fn new() -> Self {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        Self {
            deps: TestDependencies::new(),
        }
    }

    /// Register a discovery channel. Keep a clone of the `Arc` to inspect calls.
    pub fn register(&mut self, channel: Arc<dyn BaseDiscoveryChannel>) {
        self.deps.channels.register(channel);
    }

    pub fn add_intent(&self, intent: &DiscoveryIntent) {
        self.deps.intents.add(intent.clone());
    }

    pub fn disable_runner(&mut self) {
        self.deps.runner.enabled = false;
    }

    pub fn set_channel_timeout(&mut self, timeout: Duration) {
        self.deps.runner.channel_timeout = timeout;
    }

    /// Build the dependency container the activities run against.
    pub fn server_deps(&self) -> ServerDeps {
        self.deps.into_server_deps()
    }

    /// The run as currently persisted.
    pub fn stored_run(&self, id: DiscoveryRunId) -> Option<DiscoveryRun> {
        self.deps.run_store.get(id)
    }

    pub fn stored_runs(&self) -> Vec<DiscoveryRun> {
        self.deps.run_store.all()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
