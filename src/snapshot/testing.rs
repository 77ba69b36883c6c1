//! In-memory source and store for orchestrator and scheduler tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::chain::BatchStats;
use crate::db::PositionStore;
use crate::error::{AppError, Result, RpcError};
use crate::snapshot::orchestrator::PositionSource;
use crate::types::PositionRecord;

const WAD: u64 = 1_000_000_000_000_000_000;

/// Every id in `[1, max_id]` exists with weight `id` tokens, unless configured otherwise.
#[derive(Default)]
pub struct FakeSource {
    max_id: u64,
    zero_weight: HashSet<u64>,
    /// Keyed by the first id of a chunk.
    failing_chunks: HashSet<u64>,
    fatal_chunk: Option<u64>,
    failing_health_check: bool,
    fetched: Mutex<Vec<(u64, u64)>>,
    runs: AtomicUsize,
}

impl FakeSource {
    pub fn new(max_id: u64) -> Self {
        Self { max_id, ..Default::default() }
    }

    pub fn with_zero_weight(mut self, ids: &[u64]) -> Self {
        self.zero_weight.extend(ids);
        self
    }

    pub fn with_failing_chunks(mut self, first_ids: &[u64]) -> Self {
        self.failing_chunks.extend(first_ids);
        self
    }

    pub fn with_fatal_chunk(mut self, first_id: u64) -> Self {
        self.fatal_chunk = Some(first_id);
        self
    }

    pub fn with_failing_health_check(mut self) -> Self {
        self.failing_health_check = true;
        self
    }

    /// `(first, last)` id of every chunk fetched, in completion order.
    pub fn fetched_chunks(&self) -> Vec<(u64, u64)> {
        self.fetched.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Health checks performed, i.e. runs started.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    fn record(&self, id: u64) -> PositionRecord {
        let weight = if self.zero_weight.contains(&id) { 0 } else { id };
        PositionRecord {
            token_id: id,
            owner: Address::with_last_byte((id % 251) as u8),
            voting_power: U256::from(weight) * U256::from(WAD),
            locked_amount: U256::from(id) * U256::from(WAD),
            lock_end: 1_900_000_000,
        }
    }
}

#[async_trait]
impl PositionSource for FakeSource {
    async fn health_check(&self) -> Result<u64> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.failing_health_check {
            return Err(AppError::HealthCheck {
                endpoint: "https://fake.example".to_string(),
                source: Box::new(RpcError::MissingResult.into()),
            });
        }
        Ok(1_000)
    }

    async fn find_max_id(&self) -> Result<u64> {
        Ok(self.max_id)
    }

    async fn fetch_batch(&self, ids: &[u64]) -> Result<(Vec<PositionRecord>, BatchStats)> {
        let (Some(&first), Some(&last)) = (ids.first(), ids.last()) else {
            return Ok((Vec::new(), BatchStats::default()));
        };
        if let Ok(mut f) = self.fetched.lock() {
            f.push((first, last));
        }
        if self.fatal_chunk == Some(first) {
            return Err(RpcError::EndpointsExhausted.into());
        }
        if self.failing_chunks.contains(&first) {
            return Err(AppError::RetriesExhausted {
                attempts: 3,
                endpoint: "https://fake.example".to_string(),
                source: Box::new(RpcError::JsonRpc { code: -32000, message: "header not found".into() }.into()),
            });
        }
        let records: Vec<_> = ids.iter().map(|&id| self.record(id)).collect();
        let stats = BatchStats { requested: ids.len(), decoded: records.len(), ..Default::default() };
        Ok((records, stats))
    }

    async fn total_supply(&self) -> Result<U256> {
        let total: u64 = (1..=self.max_id).filter(|id| !self.zero_weight.contains(id)).sum();
        Ok(U256::from(total) * U256::from(WAD))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<u64, PositionRecord>>,
    failing: HashSet<u64>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_writes(mut self, ids: &[u64]) -> Self {
        self.failing.extend(ids);
        self
    }

    pub fn get(&self, token_id: u64) -> Option<PositionRecord> {
        self.rows.lock().ok()?.get(&token_id).cloned()
    }

    pub fn all(&self) -> Vec<PositionRecord> {
        self.rows.lock().map(|r| r.values().cloned().collect()).unwrap_or_default()
    }

    /// Successful `replace` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn replace(&self, record: &PositionRecord, _snapshot_time: DateTime<Utc>) -> Result<()> {
        if self.failing.contains(&record.token_id) {
            return Err(AppError::Io(std::io::Error::other("disk full")));
        }
        if let Ok(mut rows) = self.rows.lock() {
            rows.insert(record.token_id, record.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.rows.lock().map(|r| r.len() as u64).unwrap_or(0))
    }

    async fn total_voting_power(&self) -> Result<f64> {
        Ok(self
            .all()
            .iter()
            .map(|r| r.voting_power_formatted(18))
            .sum())
    }
}
