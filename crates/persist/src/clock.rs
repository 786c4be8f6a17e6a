use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::record::Timestamp;

/// Strictly increasing millisecond clock.
///
/// Returns wall-clock milliseconds unless that would repeat or go backwards,
/// in which case it returns one past the last value handed out. Two commits,
/// stashes, or records created in the same millisecond therefore never share
/// an identity. Saturates at `Timestamp::MAX`.
#[derive(Debug, Default)]
pub struct Clock {
    last: AtomicU64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unique timestamp.
    pub fn next(&self) -> Timestamp {
        let now = wall_clock_ms();
        let prev = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        now.max(prev.saturating_add(1))
    }

    /// Ensure every later [`Clock::next`] is strictly greater than `ts`.
    pub fn observe(&self, ts: Timestamp) {
        self.last.fetch_max(ts, Ordering::AcqRel);
    }

    /// Last value handed out or observed.
    pub fn last(&self) -> Timestamp {
        self.last.load(Ordering::Acquire)
    }
}

fn wall_clock_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn consecutive_values_strictly_increase() {
        let clock = Clock::new();
        let mut prev = clock.next();
        for _ in 0..10_000 {
            let t = clock.next();
            assert!(t > prev);
            prev = t;
        }
    }

    #[test]
    fn observe_pushes_clock_past_future_values() {
        let clock = Clock::new();
        let far = wall_clock_ms() + 1_000_000;
        clock.observe(far);
        assert_eq!(clock.next(), far + 1);
    }

    #[test]
    fn observing_the_maximum_saturates() {
        let clock = Clock::new();
        clock.observe(Timestamp::MAX);
        assert_eq!(clock.next(), Timestamp::MAX);
        assert_eq!(clock.last(), Timestamp::MAX);
    }

    #[test]
    fn concurrent_callers_never_collide() {
        let clock = Arc::new(Clock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                std::thread::spawn(move || (0..1000).map(|_| clock.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for t in h.join().unwrap() {
                assert!(seen.insert(t), "duplicate timestamp {t}");
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
