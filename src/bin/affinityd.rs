//! affinity-engine HTTP server binary.
//!
//! Loads the configuration, opens the live document, starts the monthly
//! reward schedule and serves the JSON API.
//!
//! # Environment Variables
//!
//! - `PORT`: HTTP port (default: 8080)
//! - `AFFINITY_CONFIG`: optional YAML config file
//! - `AFFINITY_DATA_DIR`: directory for the live document and archives
//! - `AFFINITY_API_KEY`: enables generated custom personas
//! - `RUST_LOG`: Tracing filter (default: "info,affinity_engine=debug")
//!
//! # Usage
//!
//! ```bash
//! AFFINITY_DATA_DIR=/var/lib/affinity cargo run --bin affinityd
//! ```

use std::sync::Arc;

use anyhow::Context;

use affinity_engine::server::{app_router, AppState};
use affinity_engine::{AffinityConfig, AffinityEngine, RewardSchedule};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,affinity_engine=debug".into()),
        )
        .init();

    let config = AffinityConfig::from_env().context("loading configuration")?;
    let schedule = RewardSchedule::from_config(&config.rewards).context("reading reward schedule")?;

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_addr = format!("0.0.0.0:{}", port);

    let engine = Arc::new(AffinityEngine::from_config(&config));
    tracing::info!(
        identities = engine.identity_count(),
        data_dir = %config.storage.data_dir.display(),
        "Affinity store opened"
    );

    let _schedule = schedule.spawn(Arc::clone(&engine));
    tracing::info!(
        "Reward cycle scheduled for day {} at {}",
        config.rewards.cycle_day,
        config.rewards.cycle_time
    );

    let app = app_router(AppState::new(engine));

    tracing::info!("affinity-engine server starting on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
