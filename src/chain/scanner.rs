use std::sync::Arc;

use alloy_primitives::{Address, U256};
use alloy_rpc_types_eth::{Filter, Log};
use alloy_sol_types::SolEvent;
use tracing::{debug, info, warn};

use crate::abi::IVotingEscrow;
use crate::config::Config;
use crate::error::Result;
use crate::rpc::client::ResilientClient;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub max_id: u64,
    pub from_block: u64,
    pub to_block: u64,
    pub windows: usize,
    pub logs: usize,
    /// Narrow windows that failed and were skipped.
    pub skipped_windows: usize,
}

/// Finds the highest token id minted or moved in a recent block window by
/// scanning `Transfer` logs of the escrow contract.
pub struct TokenRangeScanner {
    client: Arc<ResilientClient>,
    contract: Address,
    lookback: u64,
    step: u64,
    fallback_step: u64,
}

impl TokenRangeScanner {
    pub fn new(
        client: Arc<ResilientClient>,
        contract: Address,
        lookback: u64,
        step: u64,
        fallback_step: u64,
    ) -> Self {
        Self {
            client,
            contract,
            lookback,
            step: step.max(1),
            fallback_step: fallback_step.max(1),
        }
    }

    pub fn from_config(cfg: &Config, client: Arc<ResilientClient>) -> Self {
        Self::new(
            client,
            cfg.ve_contract,
            cfg.scan_lookback_blocks,
            cfg.scan_step_blocks,
            cfg.scan_fallback_step_blocks,
        )
    }

    pub async fn find_max_id(&self) -> Result<u64> {
        Ok(self.scan().await?.max_id)
    }

    /// Scan `[latest - lookback, latest]` in `step`-sized windows. A failed
    /// window is re-covered with `fallback_step` windows; a failed narrow window
    /// is skipped. Only fatal errors end the scan early.
    pub async fn scan(&self) -> Result<ScanReport> {
        let latest = self.client.block_number().await?;
        let mut report = ScanReport {
            from_block: latest.saturating_sub(self.lookback),
            to_block: latest,
            ..Default::default()
        };

        info!(
            from = report.from_block,
            to = report.to_block,
            step = self.step,
            "[SCAN] scanning Transfer logs for max token id"
        );

        for (from, to) in windows(report.from_block, report.to_block, self.step) {
            report.windows += 1;
            match self.logs_in(from, to).await {
                Ok(logs) => self.absorb(&mut report, &logs),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(from, to, "[SCAN] window failed, retrying with narrow step: {e}");
                    self.rescan_narrow(&mut report, from, to).await?;
                }
            }
        }

        info!(
            max_id = report.max_id,
            logs = report.logs,
            windows = report.windows,
            skipped = report.skipped_windows,
            "[SCAN] max token id {}",
            report.max_id
        );
        Ok(report)
    }

    async fn rescan_narrow(&self, report: &mut ScanReport, from: u64, to: u64) -> Result<()> {
        for (lo, hi) in windows(from, to, self.fallback_step) {
            report.windows += 1;
            match self.logs_in(lo, hi).await {
                Ok(logs) => self.absorb(report, &logs),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    report.skipped_windows += 1;
                    warn!(from = lo, to = hi, "[SCAN] skipping window: {e}");
                }
            }
        }
        Ok(())
    }

    async fn logs_in(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .address(self.contract)
            .event_signature(IVotingEscrow::Transfer::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block);
        self.client.get_logs(&filter).await
    }

    fn absorb(&self, report: &mut ScanReport, logs: &[Log]) {
        report.logs += logs.len();
        for log in logs {
            match token_id_of(log) {
                Some(id) => report.max_id = report.max_id.max(id),
                None => debug!(topics = ?log.topics(), "[SCAN] ignoring log without a usable tokenId topic"),
            }
        }
    }
}

/// Inclusive `[from, to]` split into consecutive windows of at most `step` blocks.
fn windows(from: u64, to: u64, step: u64) -> impl Iterator<Item = (u64, u64)> {
    let step = step.max(1);
    let mut next = Some(from).filter(|f| *f <= to);
    std::iter::from_fn(move || {
        let lo = next?;
        let hi = lo.saturating_add(step - 1).min(to);
        next = hi.checked_add(1).filter(|n| *n <= to);
        Some((lo, hi))
    })
}

/// `tokenId` is the third indexed topic of `Transfer`.
fn token_id_of(log: &Log) -> Option<u64> {
    let topic = log.topics().get(3)?;
    u64::try_from(U256::from_be_bytes(topic.0)).ok()
}
