//! Crypto error types.

/// Errors from approval-link cryptography.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Signing key is empty")]
    EmptyKey,
}
