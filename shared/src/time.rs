use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Parse a human duration such as `"500ms"`, `"5s"`, `"1.5m"`, `"2min"` or `"1h 30min"`.
///
/// Whitespace-separated parts are summed. A part without a unit is read as milliseconds.
pub fn parse_time(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidDuration(s.to_string()));
    }

    let mut total_ms = 0f64;
    for part in s.split_whitespace() {
        total_ms += parse_part(part).ok_or_else(|| Error::InvalidDuration(s.to_string()))?;
    }

    Ok(Duration::from_millis(total_ms.round() as u64))
}

fn parse_part(part: &str) -> Option<f64> {
    // Find where the number ends and unit begins
    let num_end = part
        .chars()
        .position(|c| !c.is_ascii_digit() && c != '.')
        .unwrap_or(part.len());

    let (num_str, unit) = part.split_at(num_end);
    let num: f64 = num_str.parse().ok()?;

    let multiplier = match unit {
        "" | "ms" => 1.0,
        "s" | "sec" => 1_000.0,
        "m" | "min" => 60_000.0,
        "h" => 3_600_000.0,
        "d" => 86_400_000.0,
        _ => return None,
    };

    Some(num * multiplier)
}

/// Source of "now" for cache timestamps and staleness checks.
pub trait Clock: Send + Sync + Debug + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn at_millis(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }
}
