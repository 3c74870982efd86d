use alloy_primitives::{keccak256, B256};
use parking_lot::Mutex;
use std::collections::HashSet;

/// Default capacity of the replay-fingerprint set.
pub const DEFAULT_DEDUP_CAPACITY: usize = 100_000;

/// A bounded set of recently seen request fingerprints, used to reject
/// replayed signed submissions.
///
/// This is not a cache in the LRU sense: when the set reaches capacity it is
/// cleared wholesale before the next insert. The brief false-negative window
/// after a clear is an accepted tradeoff for O(1) amortized resets.
#[derive(Debug)]
pub struct FingerprintSet {
    capacity: usize,
    inner: Mutex<HashSet<B256>>,
}

impl FingerprintSet {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, inner: Mutex::new(HashSet::new()) }
    }

    /// Compute the fingerprint of a raw request body.
    pub fn fingerprint(body: &[u8]) -> B256 {
        keccak256(body)
    }

    /// Record the fingerprint, returning `true` if it was already present.
    ///
    /// Insertion is unconditional at check time, so a request later rejected
    /// by policy still leaves its fingerprint behind. This closes the replay
    /// probing hole where a rejected submission could be retried verbatim.
    pub fn observe(&self, fingerprint: B256) -> bool {
        let mut seen = self.inner.lock();
        if seen.contains(&fingerprint) {
            return true;
        }
        if seen.len() >= self.capacity {
            seen.clear();
        }
        seen.insert(fingerprint);
        false
    }

    /// The number of fingerprints currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_replays() {
        let set = FingerprintSet::new(16);
        let fp = FingerprintSet::fingerprint(b"some signed request body");
        assert!(!set.observe(fp));
        assert!(set.observe(fp));
    }

    #[test]
    fn clears_wholesale_at_capacity() {
        let set = FingerprintSet::new(4);
        let first = FingerprintSet::fingerprint(b"request-0");
        assert!(!set.observe(first));
        for i in 1..4u8 {
            assert!(!set.observe(B256::with_last_byte(i)));
        }
        assert_eq!(set.len(), 4);

        // The set is at capacity: the next unseen fingerprint wipes it.
        assert!(!set.observe(B256::with_last_byte(0xff)));
        assert_eq!(set.len(), 1);

        // A previously seen fingerprint is no longer rejected.
        assert!(!set.observe(first));
    }
}
