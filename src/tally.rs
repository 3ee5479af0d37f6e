use std::collections::HashMap;
use std::mem;

use parking_lot::Mutex;

/// In-memory map of option -> pending unflushed vote count, shared between
/// the broker delivery path and the flusher. All access goes through the
/// internal lock; no guard is ever held across an await point.
pub struct Tally {
    counts: Mutex<HashMap<String, u64>>,
}

impl Tally {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, option: &str) {
        let mut counts = self.counts.lock();
        *counts.entry(option.to_string()).or_insert(0) += 1;
    }

    /// Swaps in a fresh map and returns everything recorded so far. Votes
    /// recorded while the snapshot is being flushed land in the new map, so
    /// they are neither lost nor counted twice.
    pub fn snapshot_and_clear(&self) -> HashMap<String, u64> {
        mem::take(&mut *self.counts.lock())
    }

    /// Returns counts that could not be flushed. They combine with whatever
    /// has been recorded since the snapshot and retry on the next tick.
    pub fn merge(&self, pending: HashMap<String, u64>) {
        let mut counts = self.counts.lock();
        for (option, count) in pending {
            *counts.entry(option).or_insert(0) += count;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.lock().is_empty()
    }
}

impl Default for Tally {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn snapshot_drains_counts() {
        let tally = Tally::new();
        tally.record("happy");
        tally.record("happy");
        tally.record("sad");

        let snap = tally.snapshot_and_clear();
        assert_eq!(snap.get("happy"), Some(&2));
        assert_eq!(snap.get("sad"), Some(&1));
        assert!(tally.is_empty());
    }

    #[test]
    fn counts_after_snapshot_survive_into_next_snapshot() {
        let tally = Tally::new();
        tally.record("happy");
        let first = tally.snapshot_and_clear();

        tally.record("happy");
        tally.record("win");
        let second = tally.snapshot_and_clear();

        assert_eq!(first.get("happy"), Some(&1));
        assert_eq!(second.get("happy"), Some(&1));
        assert_eq!(second.get("win"), Some(&1));
    }

    #[test]
    fn merge_combines_with_new_votes() {
        let tally = Tally::new();
        tally.record("happy");
        let failed = tally.snapshot_and_clear();

        tally.record("happy");
        tally.merge(failed);

        let snap = tally.snapshot_and_clear();
        assert_eq!(snap.get("happy"), Some(&2));
    }

    #[test]
    fn no_increment_is_lost_under_concurrent_snapshots() {
        const WRITERS: usize = 4;
        const PER_WRITER: u64 = 1_000;

        let tally = Arc::new(Tally::new());
        let mut handles = Vec::new();
        for _ in 0..WRITERS {
            let tally = Arc::clone(&tally);
            handles.push(thread::spawn(move || {
                for _ in 0..PER_WRITER {
                    tally.record("happy");
                }
            }));
        }

        // snapshot repeatedly while writers are running
        let mut total = 0;
        while handles.iter().any(|h| !h.is_finished()) {
            total += tally.snapshot_and_clear().get("happy").copied().unwrap_or(0);
        }
        for handle in handles {
            handle.join().unwrap();
        }
        total += tally.snapshot_and_clear().get("happy").copied().unwrap_or(0);

        assert_eq!(total, WRITERS as u64 * PER_WRITER);
    }
}
