//! `Warden` Core Library
//!
//! Shared functionality for `Warden` components:
//! - Detection-event normalization into a single [`Finding`] record
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers shared by storage layers
//! - Common error types and tracing setup

pub mod config;
pub mod db;
pub mod error;
pub mod finding;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use finding::{Finding, NormalizeError};
