//! `Warden` Approval-Link Cryptography
//!
//! Primitives behind the restore-approval link:
//!
//! - **Token**: 128 bits from the OS RNG, hex-encoded, used as the record key
//! - **Signature**: HMAC-SHA256 over `instanceId|findingId|token`, hex-encoded
//! - **Verification**: recomputed and compared in constant time

pub mod error;
pub mod signature;
pub mod token;

pub use error::CryptoError;
pub use signature::{ApprovalSigner, approval_message};
pub use token::{TOKEN_BYTES, generate_token};
