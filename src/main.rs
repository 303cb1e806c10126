mod api;
mod config;
mod db;
mod error;
mod fetcher;
mod normalizer;
mod query;
mod refresh;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::SourceLatency;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::SqliteStore;
use crate::error::Result;
use crate::fetcher::build_sources;
use crate::query::MarketDataQuery;
use crate::refresh::{RefreshOrchestrator, RefreshScheduler};

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
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);
    let store = SqliteStore::new(pool);

    // --- Sources ---
    let sources = build_sources(&cfg)?;
    info!(
        "Configured {} sources: {}",
        sources.len(),
        sources.iter().map(|s| s.name()).collect::<Vec<_>>().join(", "),
    );
    if cfg.polygon_api_key.is_none() {
        warn!("POLYGON_API_KEY not set; pre-market movers and market holidays will fail every refresh");
    }
    if cfg.browser_paths.is_empty() {
        warn!("BROWSER_PATHS is empty; script-rendered pages cannot be scraped");
    }

    // --- Refresh pipeline ---
    let latency = Arc::new(SourceLatency::new());
    let health = Arc::new(HealthState::new());
    let orchestrator = Arc::new(RefreshOrchestrator::new(
        sources,
        store.clone(),
        Arc::clone(&latency),
        Arc::clone(&health),
    ));

    // Refresh scheduler (background, every REFRESH_INTERVAL_SECS)
    let scheduler = RefreshScheduler::new(&cfg, Arc::clone(&orchestrator));
    tokio::spawn(async move { scheduler.run().await });

    // HTTP API server
    let api_state = ApiState {
        query: MarketDataQuery::new(store),
        orchestrator,
        health,
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
