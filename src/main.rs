mod abi;
mod chain;
mod config;
mod db;
mod error;
mod rpc;
mod snapshot;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::db::SqliteStore;
use crate::error::Result;
use crate::rpc::{ChainlistDirectory, EndpointCatalog, HttpTransport, RateLimiter, ResilientClient, RetryPolicy};
use crate::snapshot::{OnChainSource, SnapshotOrchestrator, SnapshotScheduler, SnapshotSettings};

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
    let store = Arc::new(SqliteStore::new(pool, cfg.token_decimals));

    // --- RPC stack ---
    let transport = Arc::new(HttpTransport::new(cfg.rpc_timeout)?);
    let directory = Arc::new(ChainlistDirectory::new(cfg.chainlist_url.clone(), cfg.rpc_timeout)?);
    let catalog = Arc::new(EndpointCatalog::from_config(&cfg, directory, transport.clone()));
    let limiter = Arc::new(RateLimiter::new(cfg.rate_limit_window, cfg.rate_limit_max_requests));
    let client = Arc::new(ResilientClient::new(
        catalog,
        limiter,
        transport,
        RetryPolicy::from_config(&cfg),
    ));

    info!(
        chain_id = cfg.chain_id,
        contract = %cfg.ve_contract,
        chunk_size = cfg.chunk_size,
        wave_size = cfg.wave_size,
        "Snapshot pipeline configured"
    );

    // --- Snapshot ---
    let source = Arc::new(OnChainSource::from_config(&cfg, client));
    let orchestrator = Arc::new(SnapshotOrchestrator::new(
        source,
        store,
        SnapshotSettings::from_config(&cfg),
    ));
    let scheduler = SnapshotScheduler::new(orchestrator, Duration::from_secs(cfg.snapshot_interval_secs));

    scheduler.run().await
}
