//! Restate Discovery Server
//!
//! This binary runs the Restate HTTP endpoint that serves the discovery
//! service, plus the optional scheduled discovery job.

use std::sync::Arc;

use anyhow::{Context, Result};
use leadgen_core::domains::discovery::restate::{DiscoveryService, DiscoveryServiceImpl};
use leadgen_core::kernel::{scheduled_tasks, ChannelRegistry, ServerDeps, TavilyChannel};
use leadgen_core::Config;
use restate_sdk::prelude::*;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,leadgen_core=debug,restate_sdk=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting Lead Discovery Server");

    let config = Config::from_env()?;

    // Database setup
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    // Discovery channels
    let mut channels = ChannelRegistry::new();
    match &config.tavily_api_key {
        Some(key) => {
            channels.register(Arc::new(
                TavilyChannel::new(key.clone()).context("Failed to create Tavily channel")?,
            ));
        }
        None => tracing::warn!("TAVILY_API_KEY not set, web_search channel disabled"),
    }
    if channels.is_empty() {
        tracing::warn!("No discovery channels registered; every run will fail");
    } else {
        tracing::info!(channels = ?channels.names(), "Discovery channels registered");
    }

    let runner = config.runner();
    if !runner.enabled {
        tracing::warn!("Discovery runner is disabled; runs will be refused");
    }

    // Build ServerDeps and wrap in Arc for sharing across handlers
    let server_deps = Arc::new(ServerDeps::postgres(pool, channels, runner));

    // Keep the scheduler alive for the lifetime of the server
    let _scheduler = match config.schedule.clone() {
        Some(schedule) => Some(
            scheduled_tasks::start_scheduler(server_deps.clone(), schedule)
                .await
                .context("Failed to start discovery scheduler")?,
        ),
        None => None,
    };

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Server listening on {}", addr);

    // Build Restate endpoint
    let mut builder = Endpoint::builder();

    // Configure Restate request identity verification
    if let Some(identity_key) = &config.restate_identity_key {
        tracing::info!("Restate identity key configured");
        builder = builder
            .identity_key(identity_key)
            .context("Invalid Restate identity key")?;
    }

    let endpoint = builder
        .bind(DiscoveryServiceImpl::with_deps(server_deps.clone()).serve())
        .build();

    // Start HTTP server
    HttpServer::new(endpoint)
        .listen_and_serve(addr.parse()?)
        .await;

    Ok(())
}
