//! Approval gate.
//!
//! Two steps driven by the `confirm` query parameter:
//!
//! 1. Without `confirm`, render a confirmation prompt that carries the link
//!    parameters forward. Nothing is validated or mutated.
//! 2. With `confirm`, validate the token and, if every check passes, consume
//!    it and hand the restore off to the dispatcher.
//!
//! Step 2 checks run strictly in order and stop at the first failure:
//! configuration, well-formedness, existence, replay, expiry, binding,
//! signature, atomic consume.

pub mod page;


use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use url::form_urlencoded;
use warden_crypto::ApprovalSigner;

use crate::clock::Clock;
use crate::restore::{RestoreDispatcher, RestoreRequest};
use crate::secrets::SecretStore;
use crate::storage::{ConsumeResult, TokenStore, token_prefix};

/// Parameters of an approval link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub instance_id: String,
    pub finding_id: String,
    pub finding_title: String,
    pub token: String,
    pub signature: String,
    pub confirm: bool,
}

impl ApprovalRequest {
    /// Build from decoded query pairs. The first occurrence of a key wins;
    /// values are trimmed.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map: HashMap<String, String> = HashMap::new();
        for (k, v) in pairs {
            map.entry(k.as_ref().to_string())
                .or_insert_with(|| v.as_ref().trim().to_string());
        }
        let pick = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| map.get(*k).filter(|v| !v.is_empty()))
                .cloned()
                .unwrap_or_default()
        };

        Self {
            instance_id: pick(&["instanceId", "InstanceId"]),
            finding_id: pick(&["findingId"]),
            finding_title: pick(&["findingTitle"]),
            token: pick(&["token"]),
            signature: pick(&["signature", "sig"]),
            confirm: is_truthy(&pick(&["confirm"])),
        }
    }

    /// Parse a raw (still percent-encoded) query string.
    pub fn from_query(raw: &str) -> Self {
        Self::from_query_pairs(form_urlencoded::parse(raw.as_bytes()))
    }

    /// Query string of the second-step link: same parameters plus `confirm=1`.
    pub fn confirmation_query(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("instanceId", &self.instance_id)
            .append_pair("findingId", &self.finding_id)
            .append_pair("findingTitle", &self.finding_title)
            .append_pair("token", &self.token)
            .append_pair("signature", &self.signature)
            .append_pair("confirm", "1")
            .finish()
    }

    /// Title if present, else the finding id.
    pub fn display_finding(&self) -> &str {
        if self.finding_title.is_empty() {
            &self.finding_id
        } else {
            &self.finding_title
        }
    }
}

fn is_truthy(value: &str) -> bool {
    ["1", "yes", "true"]
        .iter()
        .any(|t| value.eq_ignore_ascii_case(t))
}

/// Why a confirmed request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Config,
    Malformed,
    NotFound,
    Replayed,
    Expired,
    Mismatch,
    BadSignature,
}

impl Rejection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "REJECTED_CONFIG",
            Self::Malformed => "REJECTED_MALFORMED",
            Self::NotFound => "REJECTED_NOT_FOUND",
            Self::Replayed => "REJECTED_REPLAYED",
            Self::Expired => "REJECTED_EXPIRED",
            Self::Mismatch => "REJECTED_MISMATCH",
            Self::BadSignature => "REJECTED_BAD_SIGNATURE",
        }
    }
}

/// Result of one gate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// First step: show the prompt.
    ConfirmationRequired,
    /// First step without an instance or finding id.
    MissingParameters,
    /// Token consumed and restore dispatched.
    Authorized,
    Rejected(Rejection),
    /// A collaborator failed before the token was consumed.
    ServiceError,
    /// Token consumed but the restore could not be dispatched.
    DispatchFailed(String),
}

impl GateOutcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ConfirmationRequired => "CONFIRMATION_REQUIRED",
            Self::MissingParameters => "MISSING_PARAMETERS",
            Self::Authorized => "AUTHORIZED",
            Self::Rejected(r) => r.as_str(),
            Self::ServiceError => "SERVICE_ERROR",
            Self::DispatchFailed(_) => "DISPATCH_FAILED",
        }
    }
}

/// Configuration the validation step requires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateSettings {
    /// Identity of the token store (the database location).
    pub token_store: Option<String>,
    /// Secret-store reference of the signing key.
    pub secret_ref: Option<String>,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

pub struct ApprovalGate {
    store: Arc<dyn TokenStore>,
    secrets: Arc<dyn SecretStore>,
    dispatcher: Arc<dyn RestoreDispatcher>,
    clock: Arc<dyn Clock>,
    settings: GateSettings,
}

impl ApprovalGate {
    pub fn new(
        store: Arc<dyn TokenStore>,
        secrets: Arc<dyn SecretStore>,
        dispatcher: Arc<dyn RestoreDispatcher>,
        clock: Arc<dyn Clock>,
        settings: GateSettings,
    ) -> Self {
        Self {
            store,
            secrets,
            dispatcher,
            clock,
            settings,
        }
    }

    /// Run whichever step the request is on.
    #[instrument(
        skip(self, request),
        fields(instance_id = %request.instance_id, finding_id = %request.finding_id, confirm = request.confirm)
    )]
    pub async fn handle(&self, request: &ApprovalRequest) -> GateOutcome {
        let outcome = if request.confirm {
            self.evaluate(request).await
        } else if request.instance_id.is_empty() || request.finding_id.is_empty() {
            GateOutcome::MissingParameters
        } else {
            GateOutcome::ConfirmationRequired
        };

        info!(outcome = outcome.as_str(), "Gate request handled");
        #[cfg(feature = "metrics")]
        warden_core::metrics::record_gate_outcome(outcome.as_str());
        outcome
    }

    /// The validation step.
    pub async fn evaluate(&self, request: &ApprovalRequest) -> GateOutcome {
        let (Some(_), Some(secret_ref)) = (
            present(self.settings.token_store.as_deref()),
            present(self.settings.secret_ref.as_deref()),
        ) else {
            warn!("Token store or secret reference not configured");
            return GateOutcome::Rejected(Rejection::Config);
        };

        if request.token.is_empty() || request.signature.is_empty() {
            return GateOutcome::Rejected(Rejection::Malformed);
        }
        let token = request.token.as_str();
        let prefix = token_prefix(token);

        let record = match self.store.get(token).await {
            Ok(Some(record)) => record,
            Ok(None) => return GateOutcome::Rejected(Rejection::NotFound),
            Err(e) => {
                error!(token = prefix, error = %e, "Token lookup failed");
                return GateOutcome::ServiceError;
            }
        };

        if record.used {
            return GateOutcome::Rejected(Rejection::Replayed);
        }
        if record.is_expired_at(self.clock.now()) {
            return GateOutcome::Rejected(Rejection::Expired);
        }
        if !record.is_bound_to(&request.instance_id, &request.finding_id) {
            warn!(token = prefix, "Token bound to a different instance or finding");
            return GateOutcome::Rejected(Rejection::Mismatch);
        }

        let secret = match self.secrets.get_secret(secret_ref).await {
            Ok(secret) => secret,
            Err(e) => {
                error!(error = %e, "Signing secret unavailable");
                return GateOutcome::ServiceError;
            }
        };
        let verified = ApprovalSigner::new(&secret).and_then(|signer| {
            signer.verify(
                &request.instance_id,
                &request.finding_id,
                token,
                &request.signature,
            )
        });
        match verified {
            Ok(true) => {}
            Ok(false) => {
                warn!(token = prefix, "Signature check failed");
                return GateOutcome::Rejected(Rejection::BadSignature);
            }
            Err(e) => {
                error!(error = %e, "Signing key unusable");
                return GateOutcome::ServiceError;
            }
        }

        match self.store.conditional_set_used(token).await {
            Ok(ConsumeResult::Consumed) => {}
            Ok(ConsumeResult::ConditionFailed) => {
                return GateOutcome::Rejected(Rejection::Replayed);
            }
            Err(e) => {
                error!(token = prefix, error = %e, "Token consume failed");
                return GateOutcome::ServiceError;
            }
        }
        info!(token = prefix, "Token consumed");

        match self.dispatcher.dispatch(RestoreRequest::from_approval(
            &request.instance_id,
            &request.finding_id,
        )) {
            Ok(()) => GateOutcome::Authorized,
            Err(e) => {
                error!(error = %e, "Restore dispatch failed");
                GateOutcome::DispatchFailed(e.to_string())
            }
        }
    }
}
