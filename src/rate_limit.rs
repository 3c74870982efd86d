use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use crate::statics::clamp_to_duration_bucket;

/// A bucketed counter over a rolling lookback window.
#[derive(Debug)]
pub struct CounterOverTime {
    lookback: Duration,
    nb_buckets: u32,
    entries: BTreeMap<Instant, u64>,
    // Invariant: the sum of the values in `entries` should be equal to `sum_entries`.
    sum_entries: u64,
}

impl CounterOverTime {
    /// `lookback` is the duration of the rolling lookback window.
    /// `nb_buckets` is the number of buckets we split it into (the more, the more precise we are)
    pub fn new(lookback: Duration, nb_buckets: u32) -> Self {
        Self { lookback, nb_buckets, entries: BTreeMap::new(), sum_entries: 0 }
    }

    fn cleanup(&mut self) {
        // We remove the first entry of `self.entries` as long as it's outside
        // of our look-back window.
        let now = Instant::now();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key() >= &(now - self.lookback) {
                return;
            }
            self.sum_entries -= entry.remove();
        }
        debug_assert_eq!(self.sum_entries, 0);
    }

    pub fn add(&mut self, amount: u64, time: Instant) {
        self.cleanup();
        let duration_bucket = clamp_to_duration_bucket(time, self.lookback / self.nb_buckets);
        *self.entries.entry(duration_bucket).or_default() += amount;
        self.sum_entries += amount;
    }

    pub fn inc(&mut self) -> u64 {
        self.add(1, Instant::now());
        self.sum_entries
    }

    pub fn count(&mut self) -> u64 {
        self.cleanup();
        self.sum_entries
    }
}

/// Limits for the two rate-limiting tiers.
///
/// The per-identity tier runs strictly before any decode or policy work; the
/// global tier is a backstop against aggregate load and only sheds traffic
/// that already passed the identity checks.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Per-identity rolling window.
    pub window: Duration,
    /// Max requests per identity per window.
    pub count: u64,
    /// Global rolling window.
    pub global_window: Duration,
    /// Max requests overall per global window.
    pub global_count: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            count: 30,
            global_window: Duration::from_secs(15),
            global_count: 60,
        }
    }
}

/// The global (tier 2) window shared by all identities.
#[derive(Debug)]
pub struct GlobalWindow {
    counter: Mutex<CounterOverTime>,
    limit: u64,
}

impl GlobalWindow {
    pub fn new(window: Duration, limit: u64) -> Self {
        Self { counter: Mutex::new(CounterOverTime::new(window, 8)), limit }
    }

    /// Record a request and return `true` if it exceeds the global limit.
    pub fn check_and_count(&self) -> bool {
        let mut counter = self.counter.lock();
        if counter.count() >= self.limit {
            return true;
        }
        counter.inc();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_counts_within_window() {
        let mut counter = CounterOverTime::new(Duration::from_secs(60), 8);
        assert_eq!(counter.count(), 0);
        for i in 1..=5 {
            assert_eq!(counter.inc(), i);
        }
        assert_eq!(counter.count(), 5);
    }

    #[test]
    fn counter_expires_old_entries() {
        let mut counter = CounterOverTime::new(Duration::from_millis(20), 4);
        counter.inc();
        assert_eq!(counter.count(), 1);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn global_window_sheds_excess() {
        let global = GlobalWindow::new(Duration::from_secs(60), 3);
        for _ in 0..3 {
            assert!(!global.check_and_count());
        }
        assert!(global.check_and_count());
    }
}
