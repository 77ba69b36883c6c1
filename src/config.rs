use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;

use crate::error::{AppError, Result};

/// Sonic mainnet.
pub const CHAIN_ID: u64 = 146;

pub const CHAINLIST_URL: &str = "https://chainlist.org/rpcs.json";

/// Used when the directory is unreachable, and as the last resort for `current()`.
pub const FALLBACK_RPCS: &[&str] = &[
    "https://sonic-rpc.publicnode.com",
    "https://rpc.soniclabs.com",
    "https://sonic.gateway.tenderly.co",
];

/// veEQUAL voting escrow.
pub const VE_CONTRACT: &str = "0x3045119766352fF250b3d45312Bd0973CBF7235a";

/// Multicall3, deployed at the same address on every supported chain.
pub const MULTICALL_ADDRESS: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

pub const DB_PATH: &str = "data/venfts.db";

/// Token ids per aggregated multicall. Kept low to stay under public RPC limits.
pub const CHUNK_SIZE: u64 = 200;

/// Chunk fetches in flight at once.
pub const WAVE_SIZE: usize = 2;

/// Pause between waves (milliseconds).
pub const WAVE_DELAY_MS: u64 = 500;

pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;
pub const RATE_LIMIT_MAX_REQUESTS: u32 = 1000;

pub const RETRY_MAX_ATTEMPTS: u32 = 3;
/// Hard failures back off `base * 2^(attempt-1)`: 1s, 2s, 4s.
pub const RETRY_BASE_DELAY_MS: u64 = 1000;
/// Fixed wait after a rate-limited attempt.
pub const RATE_LIMIT_RETRY_DELAY_MS: u64 = 1000;

pub const RPC_TIMEOUT_SECS: u64 = 20;
/// Liveness probe timeout used while ranking endpoints.
pub const PROBE_TIMEOUT_SECS: u64 = 5;
/// Catalog staleness interval; `next()` refreshes once this has elapsed.
pub const CATALOG_REFRESH_SECS: u64 = 300;

pub const SCAN_LOOKBACK_BLOCKS: u64 = 1_000_000;
pub const SCAN_STEP_BLOCKS: u64 = 10_000;
pub const SCAN_FALLBACK_STEP_BLOCKS: u64 = 1_000;

/// Run aborts once errors exceed this percentage of total chunks.
pub const ERROR_BUDGET_PCT: u64 = 10;

pub const TOKEN_DECIMALS: u8 = 18;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub chain_id: u64,
    pub chainlist_url: String,
    /// FALLBACK_RPCS, comma-separated.
    pub fallback_rpcs: Vec<String>,
    pub ve_contract: Address,
    pub multicall_address: Address,
    pub chunk_size: u64,
    pub wave_size: usize,
    pub wave_delay: Duration,
    pub rate_limit_window: Duration,
    pub rate_limit_max_requests: u32,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub rate_limit_retry_delay: Duration,
    pub rpc_timeout: Duration,
    pub probe_timeout: Duration,
    pub catalog_refresh: Duration,
    pub scan_lookback_blocks: u64,
    pub scan_step_blocks: u64,
    pub scan_fallback_step_blocks: u64,
    pub error_budget_pct: u64,
    pub token_decimals: u8,
    /// Seconds between snapshot runs (SNAPSHOT_INTERVAL_SECS). 0 = run once and exit.
    pub snapshot_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cfg = Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| DB_PATH.to_string()),
            chain_id: env_or("CHAIN_ID", CHAIN_ID)?,
            chainlist_url: std::env::var("CHAINLIST_URL")
                .unwrap_or_else(|_| CHAINLIST_URL.to_string()),
            fallback_rpcs: std::env::var("FALLBACK_RPCS")
                .map(|v| parse_list(&v))
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| FALLBACK_RPCS.iter().map(|s| s.to_string()).collect()),
            ve_contract: parse_address("VE_CONTRACT", VE_CONTRACT)?,
            multicall_address: parse_address("MULTICALL_ADDRESS", MULTICALL_ADDRESS)?,
            chunk_size: env_or("CHUNK_SIZE", CHUNK_SIZE)?,
            wave_size: env_or("WAVE_SIZE", WAVE_SIZE)?,
            wave_delay: Duration::from_millis(env_or("WAVE_DELAY_MS", WAVE_DELAY_MS)?),
            rate_limit_window: Duration::from_secs(env_or(
                "RATE_LIMIT_WINDOW_SECS",
                RATE_LIMIT_WINDOW_SECS,
            )?),
            rate_limit_max_requests: env_or("RATE_LIMIT_MAX_REQUESTS", RATE_LIMIT_MAX_REQUESTS)?,
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", RETRY_MAX_ATTEMPTS)?,
            retry_base_delay: Duration::from_millis(env_or(
                "RETRY_BASE_DELAY_MS",
                RETRY_BASE_DELAY_MS,
            )?),
            rate_limit_retry_delay: Duration::from_millis(env_or(
                "RATE_LIMIT_RETRY_DELAY_MS",
                RATE_LIMIT_RETRY_DELAY_MS,
            )?),
            rpc_timeout: Duration::from_secs(env_or("RPC_TIMEOUT_SECS", RPC_TIMEOUT_SECS)?),
            probe_timeout: Duration::from_secs(env_or("PROBE_TIMEOUT_SECS", PROBE_TIMEOUT_SECS)?),
            catalog_refresh: Duration::from_secs(env_or(
                "CATALOG_REFRESH_SECS",
                CATALOG_REFRESH_SECS,
            )?),
            scan_lookback_blocks: env_or("SCAN_LOOKBACK_BLOCKS", SCAN_LOOKBACK_BLOCKS)?,
            scan_step_blocks: env_or("SCAN_STEP_BLOCKS", SCAN_STEP_BLOCKS)?,
            scan_fallback_step_blocks: env_or(
                "SCAN_FALLBACK_STEP_BLOCKS",
                SCAN_FALLBACK_STEP_BLOCKS,
            )?,
            error_budget_pct: env_or("ERROR_BUDGET_PCT", ERROR_BUDGET_PCT)?,
            token_decimals: env_or("TOKEN_DECIMALS", TOKEN_DECIMALS)?,
            snapshot_interval_secs: env_or("SNAPSHOT_INTERVAL_SECS", 0)?,
        };

        if cfg.chunk_size == 0 {
            return Err(AppError::Config("CHUNK_SIZE must be at least 1".to_string()));
        }
        if cfg.wave_size == 0 {
            return Err(AppError::Config("WAVE_SIZE must be at least 1".to_string()));
        }
        if cfg.retry_max_attempts == 0 {
            return Err(AppError::Config("RETRY_MAX_ATTEMPTS must be at least 1".to_string()));
        }
        if cfg.scan_step_blocks == 0 || cfg.scan_fallback_step_blocks == 0 {
            return Err(AppError::Config("scan step sizes must be at least 1 block".to_string()));
        }

        Ok(cfg)
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
/// A value that is set but does not parse is a configuration error.
fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has invalid value {raw:?}"))),
        Err(_) => Ok(default),
    }
}

fn parse_address(key: &str, default: &str) -> Result<Address> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    Address::from_str(raw.trim())
        .map_err(|e| AppError::Config(format!("{key} is not a valid address ({raw}): {e}")))
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_drops_blanks() {
        assert_eq!(
            parse_list(" https://a.example , ,https://b.example,"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn default_addresses_parse() {
        assert!(Address::from_str(VE_CONTRACT).is_ok());
        assert!(Address::from_str(MULTICALL_ADDRESS).is_ok());
    }
}
