use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::chain::{BatchFetcher, BatchStats, TokenRangeScanner};
use crate::config::Config;
use crate::db::PositionStore;
use crate::error::{AppError, Result};
use crate::rpc::ResilientClient;
use crate::snapshot::chunk::TokenRange;
use crate::snapshot::metrics::{LatencyStats, RunSummary, SupplyCheck};
use crate::types::{to_float, PositionRecord};

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Chain-side operations of one snapshot run.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Start a run against a freshly ranked endpoint list and return the
    /// current block. Failure is a `HealthCheck` error.
    async fn health_check(&self) -> Result<u64>;

    async fn find_max_id(&self) -> Result<u64>;

    async fn fetch_batch(&self, ids: &[u64]) -> Result<(Vec<PositionRecord>, BatchStats)>;

    async fn total_supply(&self) -> Result<U256>;
}

pub struct OnChainSource {
    client: Arc<ResilientClient>,
    scanner: TokenRangeScanner,
    fetcher: BatchFetcher,
    contract: Address,
}

impl OnChainSource {
    pub fn from_config(cfg: &Config, client: Arc<ResilientClient>) -> Self {
        Self {
            scanner: TokenRangeScanner::from_config(cfg, client.clone()),
            fetcher: BatchFetcher::from_config(cfg, client.clone()),
            contract: cfg.ve_contract,
            client,
        }
    }
}

#[async_trait]
impl PositionSource for OnChainSource {
    async fn health_check(&self) -> Result<u64> {
        let catalog = self.client.catalog();
        catalog.reset().await;
        let ranked = catalog.endpoints().await;
        info!(
            endpoints = ranked.len(),
            fastest_ms = ranked.first().and_then(|e| e.latency).map(|d| d.as_millis() as u64),
            "[SNAPSHOT] endpoint catalog ranked"
        );
        let endpoint = self.client.current_endpoint().await;
        match self.client.block_number().await {
            Ok(block) => {
                info!(endpoint = %endpoint, block, "[SNAPSHOT] health check passed");
                Ok(block)
            }
            Err(e) => Err(AppError::HealthCheck { endpoint, source: Box::new(e) }),
        }
    }

    async fn find_max_id(&self) -> Result<u64> {
        self.scanner.find_max_id().await
    }

    async fn fetch_batch(&self, ids: &[u64]) -> Result<(Vec<PositionRecord>, BatchStats)> {
        self.fetcher.fetch_batch(ids).await
    }

    async fn total_supply(&self) -> Result<U256> {
        self.client.total_supply(self.contract).await
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SnapshotSettings {
    pub chunk_size: u64,
    pub wave_size: usize,
    pub wave_delay: Duration,
    pub error_budget_pct: u64,
    pub token_decimals: u8,
}

impl SnapshotSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            chunk_size: cfg.chunk_size,
            wave_size: cfg.wave_size,
            wave_delay: cfg.wave_delay,
            error_budget_pct: cfg.error_budget_pct,
            token_decimals: cfg.token_decimals,
        }
    }
}

/// Runs one snapshot: health check, max id scan, chunked fetch in
/// bounded-parallel waves, per-record replacement, summary.
pub struct SnapshotOrchestrator {
    source: Arc<dyn PositionSource>,
    store: Arc<dyn PositionStore>,
    settings: SnapshotSettings,
}

impl SnapshotOrchestrator {
    pub fn new(
        source: Arc<dyn PositionSource>,
        store: Arc<dyn PositionStore>,
        settings: SnapshotSettings,
    ) -> Self {
        Self { source, store, settings }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::new(Utc::now());
        let latency = LatencyStats::new();
        let s = &self.settings;

        summary.block = self.source.health_check().await?;
        summary.max_id = self.source.find_max_id().await?;

        let chunks = TokenRange::new(1, summary.max_id).chunks(s.chunk_size);
        summary.total_chunks = chunks.len();
        info!(
            max_id = summary.max_id,
            chunks = chunks.len(),
            chunk_size = s.chunk_size,
            wave_size = s.wave_size,
            "[SNAPSHOT] fetching {} token ids",
            summary.max_id
        );

        let mut last_error = String::new();
        for (wave_no, wave) in chunks.chunks(s.wave_size.max(1)).enumerate() {
            if wave_no > 0 && !s.wave_delay.is_zero() {
                sleep(s.wave_delay).await;
            }

            let fetches = wave.iter().map(|chunk| async move {
                let ids = chunk.ids();
                let t = Instant::now();
                let result = self.source.fetch_batch(&ids).await;
                (*chunk, t.elapsed(), result)
            });

            let mut records = Vec::new();
            for (chunk, elapsed, result) in join_all(fetches).await {
                match result {
                    Ok((found, stats)) => {
                        latency.record(elapsed);
                        summary.positions_found += found.len();
                        summary.skipped += stats.skipped();
                        records.extend(found);
                    }
                    Err(e) if e.is_fatal() => {
                        error!(chunk = %chunk, "[SNAPSHOT] fatal error, aborting run: {e}");
                        return Err(e);
                    }
                    Err(e) => {
                        summary.chunk_errors += 1;
                        warn!(chunk = %chunk, "[SNAPSHOT] chunk fetch failed: {e}");
                        last_error = e.to_string();
                    }
                }
            }

            // Successful chunks of a wave are persisted even if the wave breaks the budget.
            for record in &records {
                if record.voting_power.is_zero() {
                    continue;
                }
                match self.store.replace(record, summary.snapshot_time).await {
                    Ok(()) => summary.records_written += 1,
                    Err(e) => {
                        summary.write_errors += 1;
                        warn!(token_id = record.token_id, "[SNAPSHOT] write failed: {e}");
                        last_error = e.to_string();
                    }
                }
            }

            let errors = summary.errors();
            if errors as u64 * 100 > summary.total_chunks as u64 * s.error_budget_pct {
                error!(
                    errors,
                    total_chunks = summary.total_chunks,
                    budget_pct = s.error_budget_pct,
                    "[SNAPSHOT] error budget exceeded after wave {}",
                    wave_no + 1
                );
                return Err(AppError::ErrorBudgetExceeded {
                    errors,
                    total_chunks: summary.total_chunks,
                    last: last_error,
                });
            }

            info!(
                wave = wave_no + 1,
                found = summary.positions_found,
                written = summary.records_written,
                errors,
                "[SNAPSHOT] wave complete"
            );
        }

        self.summarize(&mut summary, &latency).await;
        summary.elapsed = started.elapsed();

        let (p50, p95, p99) = summary.latency_ms.unwrap_or_default();
        info!(
            block = summary.block,
            max_id = summary.max_id,
            positions = summary.positions_found,
            written = summary.records_written,
            skipped = summary.skipped,
            chunk_errors = summary.chunk_errors,
            write_errors = summary.write_errors,
            stored = summary.stored_count.unwrap_or_default(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            per_sec = summary.throughput(),
            batches = summary.timed_batches,
            p50_ms = p50,
            p95_ms = p95,
            p99_ms = p99,
            "[SNAPSHOT] run complete"
        );
        Ok(summary)
    }

    /// Stored count and supply reconciliation. Failures here are logged only.
    async fn summarize(&self, summary: &mut RunSummary, latency: &LatencyStats) {
        summary.timed_batches = latency.len();
        summary.latency_ms = latency.percentiles();

        match self.store.count().await {
            Ok(n) => summary.stored_count = Some(n),
            Err(e) => warn!("[SNAPSHOT] could not count stored positions: {e}"),
        }

        let supply = match self.source.total_supply().await {
            Ok(raw) => to_float(raw, self.settings.token_decimals),
            Err(e) => {
                warn!("[SNAPSHOT] totalSupply unavailable, skipping reconciliation: {e}");
                return;
            }
        };
        match self.store.total_voting_power().await {
            Ok(stored) => {
                let check = SupplyCheck { stored, on_chain: supply };
                info!(
                    stored,
                    on_chain = supply,
                    deviation_pct = check.deviation_pct().unwrap_or_default(),
                    "[SNAPSHOT] supply reconciliation"
                );
                summary.supply = Some(check);
            }
            Err(e) => warn!("[SNAPSHOT] could not sum stored voting power: {e}"),
        }
    }
}
