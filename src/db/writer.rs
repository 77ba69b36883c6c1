use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;

#[cfg(test)]
use crate::db::models::PositionRow;
use crate::db::PositionStore;
use crate::error::{AppError, Result};
use crate::types::PositionRecord;

/// Writes position records to the SQLite `positions` table.
pub struct SqliteStore {
    pool: SqlitePool,
    decimals: u8,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, decimals: u8) -> Self {
        Self { pool, decimals }
    }

    #[cfg(test)]
    pub async fn get(&self, token_id: u64) -> Result<Option<PositionRow>> {
        let id = to_i64(token_id, token_id, "token id")?;
        let row = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT token_id, owner, voting_power_raw, voting_power,
                   locked_amount_raw, locked_amount, unlock_timestamp,
                   unlock_date, snapshot_time
            FROM positions
            WHERE token_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl PositionStore for SqliteStore {
    /// Delete-then-insert inside one transaction: at most one row per token
    /// id, and a failed write leaves the previous row in place.
    async fn replace(&self, record: &PositionRecord, snapshot_time: DateTime<Utc>) -> Result<()> {
        let token_id = to_i64(record.token_id, record.token_id, "token id")?;
        let unlock_timestamp = to_i64(record.token_id, record.lock_end, "lock end")?;
        let owner = record.owner.to_checksum(None);
        let voting_power_raw = record.voting_power.to_string();
        let locked_amount_raw = record.locked_amount.to_string();
        let voting_power = record.voting_power_formatted(self.decimals);
        let locked_amount = record.locked_amount_formatted(self.decimals);
        let unlock_date = record.unlock_date();
        let snapshot_time = snapshot_time.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM positions WHERE token_id = ?")
            .bind(token_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO positions (
                token_id, owner, voting_power_raw, voting_power,
                locked_amount_raw, locked_amount, unlock_timestamp,
                unlock_date, snapshot_time
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(token_id)
        .bind(owner)
        .bind(voting_power_raw)
        .bind(voting_power)
        .bind(locked_amount_raw)
        .bind(locked_amount)
        .bind(unlock_timestamp)
        .bind(unlock_date)
        .bind(snapshot_time)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM positions")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn total_voting_power(&self) -> Result<f64> {
        let total: Option<f64> = sqlx::query_scalar("SELECT SUM(voting_power) FROM positions")
            .fetch_one(&self.pool)
            .await?;
        Ok(total.unwrap_or(0.0))
    }
}

fn to_i64(token_id: u64, value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| AppError::InvalidRecord {
        token_id,
        reason: format!("{what} {value} exceeds the SQLite integer range"),
    })
}
