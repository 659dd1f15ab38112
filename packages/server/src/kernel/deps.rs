//! Server dependencies for discovery activities (using traits for testability)
//!
//! This module provides the central dependency container used by every
//! discovery activity. All external services and stores sit behind trait
//! abstractions so tests can swap in in-memory doubles.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::kernel::pg_stores::{PgIntentStore, PgRecordStore, PgRunStore};
use crate::kernel::{BaseDiscoveryChannel, BaseIntentStore, BaseRecordStore, BaseRunStore};

// =============================================================================
// ChannelRegistry
// =============================================================================

/// Discovery channels by name. Intents reference channels by these names.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: BTreeMap<String, Arc<dyn BaseDiscoveryChannel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel under its own name, replacing any previous one.
    pub fn register(&mut self, channel: Arc<dyn BaseDiscoveryChannel>) {
        self.channels.insert(channel.name().to_string(), channel);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn BaseDiscoveryChannel>> {
        self.channels.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

// =============================================================================
// RunnerConfig
// =============================================================================

/// Process-wide runner settings.
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    /// Kill switch. When false, no new run may start.
    pub enabled: bool,
    /// Upper bound on a single channel search call.
    pub channel_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Server dependencies accessible to activities (using traits for testability)
#[derive(Clone)]
pub struct ServerDeps {
    pub run_store: Arc<dyn BaseRunStore>,
    pub records: Arc<dyn BaseRecordStore>,
    pub intents: Arc<dyn BaseIntentStore>,
    pub channels: ChannelRegistry,
    pub runner: RunnerConfig,
}

impl ServerDeps {
    pub fn new(
        run_store: Arc<dyn BaseRunStore>,
        records: Arc<dyn BaseRecordStore>,
        intents: Arc<dyn BaseIntentStore>,
        channels: ChannelRegistry,
        runner: RunnerConfig,
    ) -> Self {
        Self {
            run_store,
            records,
            intents,
            channels,
            runner,
        }
    }

    /// Production wiring: every store backed by the same Postgres pool.
    pub fn postgres(pool: PgPool, channels: ChannelRegistry, runner: RunnerConfig) -> Self {
        Self::new(
            Arc::new(PgRunStore::new(pool.clone())),
            Arc::new(PgRecordStore::new(pool.clone())),
            Arc::new(PgIntentStore::new(pool)),
            channels,
            runner,
        )
    }
}
