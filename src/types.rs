use alloy_primitives::utils::format_units;
use alloy_primitives::{Address, U256};
use chrono::DateTime;

// ---------------------------------------------------------------------------
// PositionRecord
// ---------------------------------------------------------------------------

/// Normalized state of one veNFT lock, as read from the escrow contract.
///
/// `voting_power` is the decayed governance weight (`balanceOfNFT`) at query time.
/// `locked_amount` is the principal committed to the lock (`|locked(id).amount|`).
/// The two are kept distinct even when the contract reports equal values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRecord {
    pub token_id: u64,
    pub owner: Address,
    pub voting_power: U256,
    pub locked_amount: U256,
    /// Unix seconds; 0 means the position was never locked.
    pub lock_end: u64,
}

impl PositionRecord {
    pub fn voting_power_formatted(&self, decimals: u8) -> f64 {
        to_float(self.voting_power, decimals)
    }

    pub fn locked_amount_formatted(&self, decimals: u8) -> f64 {
        to_float(self.locked_amount, decimals)
    }

    /// `YYYY-MM-DD` in UTC, or None when the lock has no expiry.
    pub fn unlock_date(&self) -> Option<String> {
        if self.lock_end == 0 {
            return None;
        }
        let secs = i64::try_from(self.lock_end).ok()?;
        DateTime::from_timestamp(secs, 0).map(|d| d.format("%Y-%m-%d").to_string())
    }
}

/// Scale a raw token amount down by `decimals` into a float for reporting.
pub fn to_float(raw: U256, decimals: u8) -> f64 {
    format_units(raw, decimals)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}
