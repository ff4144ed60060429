//! The token-store capability the issuer and the approval gate depend on.

use async_trait::async_trait;

use super::db::GateDatabase;
use super::models::ApprovalToken;
use warden_core::db::DatabaseError;

/// Result of the conditional `used` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeResult {
    /// This caller flipped `used` from false to true.
    Consumed,
    /// The record was already used (or is gone); someone else won.
    ConditionFailed,
}

/// Durable store of approval-token records.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Fetch a record by token.
    async fn get(&self, token: &str) -> Result<Option<ApprovalToken>, DatabaseError>;

    /// Insert a new record. Fails if the token already exists.
    async fn put(&self, record: &ApprovalToken) -> Result<(), DatabaseError>;

    /// Set `used = true` only if it is currently false.
    async fn conditional_set_used(&self, token: &str) -> Result<ConsumeResult, DatabaseError>;
}

#[async_trait]
impl TokenStore for GateDatabase {
    async fn get(&self, token: &str) -> Result<Option<ApprovalToken>, DatabaseError> {
        self.get_token(token).await
    }

    async fn put(&self, record: &ApprovalToken) -> Result<(), DatabaseError> {
        self.insert_token(record).await
    }

    async fn conditional_set_used(&self, token: &str) -> Result<ConsumeResult, DatabaseError> {
        if self.consume_token(token).await? {
            Ok(ConsumeResult::Consumed)
        } else {
            Ok(ConsumeResult::ConditionFailed)
        }
    }
}
