//! Injectable wall clock.
//!
//! Cache expiry and token expiry are evaluated against a `Clock` so that
//! tests can move time forward instead of sleeping.

use crate::Timestamp;
use chrono::Utc;

/// Source of the current time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// Real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}
