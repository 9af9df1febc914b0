//! Version tokens.
//!
//! A version is the write time as an ISO-8601 UTC string with microsecond
//! precision. Callers only ever compare tokens for equality.

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

static SHARED: Lazy<Arc<VersionClock>> = Lazy::new(|| Arc::new(VersionClock::new()));

/// Issues strictly increasing timestamp tokens.
///
/// If the wall clock hasn't moved past the last issued microsecond (or has
/// gone backwards), the next token is the last one plus 1µs.
#[derive(Debug, Default)]
pub struct VersionClock {
    last_micros: AtomicI64,
}

impl VersionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide clock shared by every store.
    pub fn shared() -> Arc<VersionClock> {
        Arc::clone(&SHARED)
    }

    pub fn next(&self) -> String {
        self.next_at(Utc::now().timestamp_micros())
    }

    fn next_at(&self, now_micros: i64) -> String {
        let mut last = self.last_micros.load(Ordering::Acquire);
        loop {
            let candidate = now_micros.max(last + 1);
            match self.last_micros.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return format_micros(candidate),
                Err(actual) => last = actual,
            }
        }
    }
}

fn format_micros(micros: i64) -> String {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Micros, true))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_format() {
        let clock = VersionClock::new();
        assert_eq!(clock.next_at(1_700_000_000_000_001), "2023-11-14T22:13:20.000001Z");
    }

    #[test]
    fn test_same_instant_still_advances() {
        let clock = VersionClock::new();
        let a = clock.next_at(1_700_000_000_000_000);
        let b = clock.next_at(1_700_000_000_000_000);
        let c = clock.next_at(1_699_999_999_000_000); // clock stepped back
        assert_eq!(a, "2023-11-14T22:13:20.000000Z");
        assert_eq!(b, "2023-11-14T22:13:20.000001Z");
        assert_eq!(c, "2023-11-14T22:13:20.000002Z");
    }

    #[test]
    fn test_unique_across_threads() {
        let clock = Arc::new(VersionClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                std::thread::spawn(move || (0..500).map(|_| clock.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for token in handle.join().unwrap() {
                assert!(seen.insert(token), "duplicate version token");
            }
        }
        assert_eq!(seen.len(), 2000);
    }
}
