//! Time source for token issuance and expiry checks.

use warden_core::db::unix_timestamp;

/// Supplies the current time as Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        unix_timestamp()
    }
}
