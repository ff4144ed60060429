//! Warden Gate Library
//!
//! Incident response for compromised compute instances:
//! - Quarantine: snapshot security groups onto instance tags, then isolate
//! - Signed, single-use, time-bound approval links backed by `SQLite`
//! - A two-step approval gate that validates links before authorizing restore
//! - Restore: reapply the recorded security groups
//! - Axum HTTP surface tying the pipeline together

pub mod clock;
pub mod gate;
pub mod issuer;
pub mod notifications;
pub mod quarantine;
pub mod resources;
pub mod responder;
pub mod restore;
pub mod secrets;
pub mod server;
pub mod storage;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
