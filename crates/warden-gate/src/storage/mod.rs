//! SQLite storage for Warden approval tokens.
//!
//! The token record is the only state Warden persists. Everything else
//! lives on the instance as tags.

mod db;
mod models;
mod queries;
mod store;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests;

pub use db::GateDatabase;
pub use models::{ApprovalToken, token_prefix};
pub use store::{ConsumeResult, TokenStore};
pub use warden_core::db::DatabaseError;
