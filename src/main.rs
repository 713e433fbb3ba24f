mod api;
mod config;
mod db;
mod error;
mod gateway;
mod league;
mod poller;
mod queries;
mod raid;
mod roster;
mod types;
mod war;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::Store;
use crate::error::Result;
use crate::gateway::ApiClient;
use crate::queries::ClanSync;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let store = Store::open(&cfg.db_path).await?;

    // --- Upstream client ---
    let latency = Arc::new(LatencyStats::new());
    let api = ApiClient::new(&cfg, Arc::clone(&latency))?;
    let sync = ClanSync::new(api, store.clone(), cfg.league_poll_interval_secs);

    let clans = store.registered_clans().await?;
    if clans.is_empty() {
        warn!("No clans registered yet. POST /chats/{{chat_id}}/clan to add one.");
    } else {
        info!("Tracking {} registered clans", clans.len());
    }

    // --- Clan poller (background, whole process lifetime) ---
    let health = Arc::new(HealthState::new());
    let clan_poller = sync.clan_poller(
        Arc::clone(&health),
        Duration::from_secs(cfg.clan_poll_interval_secs),
    );
    tokio::spawn(async move { clan_poller.run().await });

    // --- HTTP API server ---
    let api_state = ApiState {
        sync,
        health,
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received, shutting down");
}
