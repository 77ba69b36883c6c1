//! Per-run instrumentation: batch latency histogram and the run summary.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Batch fetch latency in milliseconds.
pub struct LatencyStats {
    inner: Mutex<Option<hdrhistogram::Histogram<u64>>>,
}

impl LatencyStats {
    /// Tracks 1ms to 10 minutes, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 600_000, 3).ok();
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let ms = d.as_millis().clamp(1, 600_000) as u64;
        if let Ok(mut guard) = self.inner.lock() {
            if let Some(h) = guard.as_mut() {
                let _ = h.record(ms);
            }
        }
    }

    /// (p50, p95, p99) in ms. None if no samples.
    pub fn percentiles(&self) -> Option<(u64, u64, u64)> {
        let guard = self.inner.lock().ok()?;
        let h = guard.as_ref()?;
        if h.len() == 0 {
            return None;
        }
        Some((
            h.value_at_quantile(0.5),
            h.value_at_quantile(0.95),
            h.value_at_quantile(0.99),
        ))
    }

    pub fn len(&self) -> u64 {
        self.inner
            .lock()
            .ok()
            .and_then(|g| g.as_ref().map(|h| h.len()))
            .unwrap_or(0)
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Stored voting power against the contract's reported `totalSupply()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupplyCheck {
    pub stored: f64,
    pub on_chain: f64,
}

impl SupplyCheck {
    /// Signed deviation of the stored sum from on-chain supply, in percent.
    pub fn deviation_pct(&self) -> Option<f64> {
        (self.on_chain > 0.0).then(|| (self.stored - self.on_chain) / self.on_chain * 100.0)
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub snapshot_time: DateTime<Utc>,
    pub block: u64,
    pub max_id: u64,
    pub total_chunks: usize,
    pub positions_found: usize,
    pub records_written: usize,
    pub skipped: usize,
    pub chunk_errors: usize,
    pub write_errors: usize,
    /// Rows in the store after the run; None if the count query failed.
    pub stored_count: Option<u64>,
    pub elapsed: Duration,
    /// Batch fetches that completed and were timed.
    pub timed_batches: u64,
    pub latency_ms: Option<(u64, u64, u64)>,
    pub supply: Option<SupplyCheck>,
}

impl RunSummary {
    pub fn new(snapshot_time: DateTime<Utc>) -> Self {
        Self {
            snapshot_time,
            block: 0,
            max_id: 0,
            total_chunks: 0,
            positions_found: 0,
            records_written: 0,
            skipped: 0,
            chunk_errors: 0,
            write_errors: 0,
            stored_count: None,
            elapsed: Duration::ZERO,
            timed_batches: 0,
            latency_ms: None,
            supply: None,
        }
    }

    pub fn errors(&self) -> usize {
        self.chunk_errors + self.write_errors
    }

    /// Positions found per second of wall time.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.positions_found as f64 / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_none_until_recorded() {
        let stats = LatencyStats::new();
        assert_eq!(stats.percentiles(), None);

        for ms in 1..=100 {
            stats.record(Duration::from_millis(ms));
        }
        let (p50, p95, p99) = stats.percentiles().unwrap();
        assert_eq!(stats.len(), 100);
        assert!((49..=51).contains(&p50));
        assert!((94..=96).contains(&p95));
        assert!((98..=100).contains(&p99));
    }

    #[test]
    fn sub_millisecond_samples_are_kept() {
        let stats = LatencyStats::new();
        stats.record(Duration::from_micros(200));
        assert_eq!(stats.len(), 1);
    }

    #[test]
    fn throughput_and_errors() {
        let mut s = RunSummary::new(Utc::now());
        assert_eq!(s.throughput(), 0.0);
        s.positions_found = 500;
        s.elapsed = Duration::from_secs(4);
        s.chunk_errors = 2;
        s.write_errors = 1;
        assert!((s.throughput() - 125.0).abs() < 1e-9);
        assert_eq!(s.errors(), 3);
    }

    #[test]
    fn supply_deviation() {
        let check = SupplyCheck { stored: 99.0, on_chain: 100.0 };
        assert!((check.deviation_pct().unwrap() + 1.0).abs() < 1e-9);
        assert_eq!(SupplyCheck { stored: 1.0, on_chain: 0.0 }.deviation_pct(), None);
    }
}
