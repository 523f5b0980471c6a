//! Clock abstraction used for command ids and proposed txn timestamps.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Provides the current time in nanoseconds since the Unix epoch.
///
/// Monotonicity across calls is not required; a transaction timestamp taken
/// from the clock is only a proposal that the server may push forward.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall-clock implementation backed by `SystemTime`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
            .min(i64::MAX as u128) as i64
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    pub fn new(nanos: i64) -> Self {
        Self {
            nanos: AtomicI64::new(nanos),
        }
    }

    /// Move the clock forward by `delta` nanoseconds.
    pub fn advance(&self, delta: i64) {
        self.nanos.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set(&self, nanos: i64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.nanos.load(Ordering::SeqCst)
    }
}
