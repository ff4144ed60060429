//! Data models for Warden storage.

use serde::{Deserialize, Serialize};

/// A single-use approval token bound to one instance/finding pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApprovalToken {
    pub token: String,
    pub instance_id: String,
    pub finding_id: String,
    pub finding_title: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub used: bool,
}

impl ApprovalToken {
    /// Whether the token is past its expiry at `now` (expiry is exclusive).
    pub const fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Whether the record is bound to exactly this instance/finding pair.
    pub fn is_bound_to(&self, instance_id: &str, finding_id: &str) -> bool {
        self.instance_id == instance_id && self.finding_id == finding_id
    }

    /// Short token prefix safe to put in logs.
    pub fn log_prefix(&self) -> &str {
        token_prefix(&self.token)
    }
}

/// First 8 characters of a token, for log fields.
pub fn token_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}
