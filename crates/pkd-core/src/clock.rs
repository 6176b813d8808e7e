//! Clock abstraction for deterministic time in validation and upload control paths.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Mutex;

/// Source of "now" for expiration checks and upload deadlines.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// System (production) clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually controlled clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock pinned at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { inner: Mutex::new(start) }
    }

    /// Create a clock pinned at the given UNIX timestamp (seconds).
    pub fn at_timestamp(secs: i64) -> Self {
        Self::new(Utc.timestamp_opt(secs, 0).single().expect("valid timestamp"))
    }

    /// Move the clock to an absolute instant.
    pub fn set(&self, t: DateTime<Utc>) {
        *self.inner.lock().expect("clock lock poisoned") = t;
    }

    /// Advance the clock by `secs` seconds.
    pub fn advance_secs(&self, secs: i64) {
        let mut g = self.inner.lock().expect("clock lock poisoned");
        *g += chrono::Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.lock().expect("clock lock poisoned")
    }
}
