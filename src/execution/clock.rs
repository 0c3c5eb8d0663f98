use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicI64, Ordering};

use super::registry::RunId;

/// Stamp format shared by generated artifact names and `resultsUpdated`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn format_timestamp(instant: DateTime<Utc>, timezone: Tz) -> String {
    instant
        .with_timezone(&timezone)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// Generates `<name>-<millis>` ids whose numeric part strictly increases
/// even when two runs start within the same millisecond.
#[derive(Debug, Default)]
pub struct RunIdGenerator {
    last: AtomicI64,
}

impl RunIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, name: &str, now: DateTime<Utc>) -> RunId {
        let now_ms = now.timestamp_millis();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(now_ms.max(prev + 1))
            })
            .unwrap_or_else(|prev| prev);
        let stamp = now_ms.max(previous + 1);
        RunId::new(format!("{name}-{stamp}"))
    }
}
