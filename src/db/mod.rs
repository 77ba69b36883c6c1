#[cfg(test)]
pub mod models;
pub mod writer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::PositionRecord;

pub use writer::SqliteStore;

/// Persistence boundary of the snapshot. Replacing a record must leave
/// exactly one stored row for its token id.
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn replace(&self, record: &PositionRecord, snapshot_time: DateTime<Utc>) -> Result<()>;

    /// Rows currently stored.
    async fn count(&self) -> Result<u64>;

    /// Sum of formatted voting power over all stored rows.
    async fn total_voting_power(&self) -> Result<f64>;
}

/// Open (creating if needed) the SQLite database at `path` and apply migrations.
pub async fn connect(path: &str) -> Result<sqlx::SqlitePool> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{path}?mode=rwc")).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
