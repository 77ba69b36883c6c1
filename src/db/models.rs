/// Row type of the `positions` table (see migrations/0001_positions.sql).
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PositionRow {
    pub token_id: i64,
    pub owner: String,
    pub voting_power_raw: String,
    pub voting_power: f64,
    pub locked_amount_raw: String,
    pub locked_amount: f64,
    pub unlock_timestamp: i64,
    /// `YYYY-MM-DD`, NULL for locks without expiry.
    pub unlock_date: Option<String>,
    /// RFC 3339, shared by every row written in the same run.
    pub snapshot_time: String,
}
