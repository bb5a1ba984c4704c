//! Time source for audit records and generated headers.

use chrono::{DateTime, SecondsFormat, Utc};

/// Source of the current time, injected into the pipeline and registry.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// RFC 3339 timestamp with second precision.
    fn timestamp(&self) -> String {
        self.now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
