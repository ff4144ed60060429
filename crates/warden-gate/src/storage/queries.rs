//! Database queries for Warden approval tokens.

use super::db::GateDatabase;
use super::models::ApprovalToken;
use warden_core::db::DatabaseError;

impl GateDatabase {
    /// Store a freshly issued token.
    pub async fn insert_token(&self, record: &ApprovalToken) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO approval_tokens (token, instance_id, finding_id, finding_title, created_at, expires_at, used) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.token)
        .bind(&record.instance_id)
        .bind(&record.finding_id)
        .bind(&record.finding_title)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.used)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Get a token record, if any.
    pub async fn get_token(&self, token: &str) -> Result<Option<ApprovalToken>, DatabaseError> {
        let record = sqlx::query_as::<_, ApprovalToken>(
            "SELECT token, instance_id, finding_id, finding_title, created_at, expires_at, used FROM approval_tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(self.pool())
        .await?;

        Ok(record)
    }

    /// Atomically mark a token as used.
    ///
    /// Returns `true` only for the single caller that flipped the flag.
    pub async fn consume_token(&self, token: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE approval_tokens SET used = 1 WHERE token = ? AND (used IS NULL OR used = 0)",
        )
        .bind(token)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete records that expired before `cutoff`. Housekeeping only.
    pub async fn purge_expired(&self, cutoff: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM approval_tokens WHERE expires_at < ?")
            .bind(cutoff)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
