//! Token issuer: mints a single-use approval token, persists it, and signs
//! the approval link.

use std::sync::Arc;

use tracing::{info, instrument};
use url::Url;
use warden_core::db::DatabaseError;
use warden_crypto::{ApprovalSigner, CryptoError, generate_token};

use crate::clock::Clock;
use crate::secrets::{SecretError, SecretStore};
use crate::storage::{ApprovalToken, TokenStore, token_prefix};

/// Settings the issuer needs on every call.
#[derive(Debug, Clone)]
pub struct IssuerSettings {
    /// Approval endpoint the link points at.
    pub base_url: Url,
    /// Secret-store reference of the signing key.
    pub secret_ref: String,
    /// Token lifetime; already clamped at zero.
    pub ttl_secs: i64,
}

impl IssuerSettings {
    /// Build settings from raw config values. Negative `ttl_minutes` behave
    /// as zero.
    pub fn new(base_url: &str, secret_ref: &str, ttl_minutes: i64) -> Result<Self, IssueError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| IssueError::Config(format!("invalid approval base URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(IssueError::Config(format!(
                "approval base URL {base_url} is not a base URL"
            )));
        }
        if secret_ref.trim().is_empty() {
            return Err(IssueError::Config("approval secret reference is empty".into()));
        }
        Ok(Self {
            base_url,
            secret_ref: secret_ref.to_string(),
            ttl_secs: ttl_minutes.max(0).saturating_mul(60),
        })
    }
}

/// A freshly issued approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedApproval {
    pub token: String,
    pub expires_at: i64,
    pub link: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("Issuer configuration error: {0}")]
    Config(String),

    #[error("Token store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("Secret store error: {0}")]
    Secret(#[from] SecretError),

    #[error("Signing error: {0}")]
    Crypto(#[from] CryptoError),
}

pub struct TokenIssuer {
    store: Arc<dyn TokenStore>,
    secrets: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
    settings: IssuerSettings,
}

impl TokenIssuer {
    pub fn new(
        store: Arc<dyn TokenStore>,
        secrets: Arc<dyn SecretStore>,
        clock: Arc<dyn Clock>,
        settings: IssuerSettings,
    ) -> Self {
        Self {
            store,
            secrets,
            clock,
            settings,
        }
    }

    /// Issue a token for one instance/finding pair and return its link.
    ///
    /// Every call mints an independent token. The record is persisted before
    /// the secret is fetched, so a secret failure leaves an unusable record
    /// behind that simply expires.
    #[instrument(skip_all, fields(instance_id = %instance_id, finding_id = %finding_id))]
    pub async fn issue(
        &self,
        instance_id: &str,
        finding_id: &str,
        finding_title: &str,
    ) -> Result<IssuedApproval, IssueError> {
        let token = generate_token();
        let now = self.clock.now();
        let expires_at = now.saturating_add(self.settings.ttl_secs);

        self.store
            .put(&ApprovalToken {
                token: token.clone(),
                instance_id: instance_id.to_string(),
                finding_id: finding_id.to_string(),
                finding_title: finding_title.to_string(),
                created_at: now,
                expires_at,
                used: false,
            })
            .await?;

        let secret = self.secrets.get_secret(&self.settings.secret_ref).await?;
        let signature = ApprovalSigner::new(&secret)?.sign(instance_id, finding_id, &token)?;

        let mut link = self.settings.base_url.clone();
        link.query_pairs_mut()
            .clear()
            .append_pair("instanceId", instance_id)
            .append_pair("findingId", finding_id)
            .append_pair("findingTitle", finding_title)
            .append_pair("token", &token)
            .append_pair("signature", &signature);

        info!(token = token_prefix(&token), expires_at, "Approval token issued");

        Ok(IssuedApproval {
            token,
            expires_at,
            link: link.into(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::GateDatabase;
    use crate::testing::{ManualClock, StaticSecretStore};

    const NOW: i64 = 1_700_000_000;

    async fn issuer(ttl_minutes: i64) -> (TokenIssuer, GateDatabase, Arc<StaticSecretStore>) {
        let db = GateDatabase::open_in_memory().await.unwrap();
        let secrets = Arc::new(StaticSecretStore::new(b"k".to_vec()));
        let settings =
            IssuerSettings::new("https://approve.example.com/approve", "key", ttl_minutes).unwrap();
        let issuer = TokenIssuer::new(
            Arc::new(db.clone()),
            secrets.clone(),
            Arc::new(ManualClock::new(NOW)),
            settings,
        );
        (issuer, db, secrets)
    }

    fn query(link: &str) -> std::collections::HashMap<String, String> {
        Url::parse(link).unwrap().query_pairs().into_owned().collect()
    }

    #[tokio::test]
    async fn issue_persists_unused_record() {
        let (issuer, db, _) = issuer(60).await;
        let issued = issuer.issue("i-1", "f-1", "Port probe").await.unwrap();

        let record = db.get_token(&issued.token).await.unwrap().unwrap();
        assert_eq!(record.instance_id, "i-1");
        assert_eq!(record.finding_id, "f-1");
        assert_eq!(record.finding_title, "Port probe");
        assert_eq!(record.created_at, NOW);
        assert_eq!(record.expires_at, NOW + 3600);
        assert!(!record.used);
        assert_eq!(issued.expires_at, NOW + 3600);
    }

    #[tokio::test]
    async fn link_carries_signed_parameters() {
        let (issuer, _, _) = issuer(60).await;
        let issued = issuer.issue("i-1", "f/1&x", "A & B").await.unwrap();

        assert!(issued.link.starts_with("https://approve.example.com/approve?"));
        let q = query(&issued.link);
        assert_eq!(q["instanceId"], "i-1");
        assert_eq!(q["findingId"], "f/1&x");
        assert_eq!(q["findingTitle"], "A & B");
        assert_eq!(q["token"], issued.token);

        let signer = ApprovalSigner::new(b"k").unwrap();
        assert!(signer.verify("i-1", "f/1&x", &issued.token, &q["signature"]).unwrap());
    }

    #[tokio::test]
    async fn repeated_issue_mints_independent_tokens() {
        let (issuer, db, _) = issuer(60).await;
        let a = issuer.issue("i-1", "f-1", "").await.unwrap();
        let b = issuer.issue("i-1", "f-1", "").await.unwrap();
        assert_ne!(a.token, b.token);
        assert!(db.consume_token(&a.token).await.unwrap());
        assert!(!db.get_token(&b.token).await.unwrap().unwrap().used);
    }

    #[tokio::test]
    async fn negative_ttl_expires_immediately() {
        let (issuer, _, _) = issuer(-5).await;
        let issued = issuer.issue("i-1", "f-1", "").await.unwrap();
        assert_eq!(issued.expires_at, NOW);
    }

    #[tokio::test]
    async fn secret_is_fetched_per_issue() {
        let (issuer, _, secrets) = issuer(60).await;
        issuer.issue("i-1", "f-1", "").await.unwrap();
        issuer.issue("i-1", "f-1", "").await.unwrap();
        assert_eq!(secrets.fetches(), 2);
    }

    #[tokio::test]
    async fn secret_failure_after_persist() {
        let (issuer, db, secrets) = issuer(60).await;
        secrets.set_unavailable(true);
        let err = issuer.issue("i-1", "f-1", "").await.unwrap_err();
        assert!(matches!(err, IssueError::Secret(_)));
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM approval_tokens")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn settings_reject_bad_base_url() {
        assert!(matches!(
            IssuerSettings::new("not a url", "key", 60),
            Err(IssueError::Config(_))
        ));
        assert!(matches!(
            IssuerSettings::new("https://x", " ", 60),
            Err(IssueError::Config(_))
        ));
    }
}
