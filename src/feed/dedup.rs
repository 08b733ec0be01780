use std::collections::{HashSet, VecDeque};

use crate::models::Trade;

/// Filters out trades already seen, by id
///
/// Keeps the last `capacity` ids. Ids are monotonic-ish, so anything at or below the
/// highest evicted id is also reported as a duplicate: a replay from before the window
/// cannot slip through. The cost is that a genuinely new trade delayed past the whole
/// window is dropped too; this is an accepted approximation.
#[derive(Debug)]
pub struct Deduplicator {
    window: VecDeque<u64>,
    seen: HashSet<u64>,
    capacity: usize,
    watermark: Option<u64>,
    duplicates: u64,
}

impl Deduplicator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity,
            watermark: None,
            duplicates: 0,
        }
    }

    /// Returns true exactly once per unique id
    pub fn observe(&mut self, id: u64) -> bool {
        let below_watermark = self.watermark.is_some_and(|w| id <= w);

        if below_watermark || self.seen.contains(&id) {
            self.duplicates += 1;
            return false;
        }

        self.seen.insert(id);
        self.window.push_back(id);

        while self.window.len() > self.capacity {
            if let Some(evicted) = self.window.pop_front() {
                self.seen.remove(&evicted);
                self.watermark = Some(self.watermark.map_or(evicted, |w| w.max(evicted)));
            }
        }

        true
    }

    pub fn is_novel(&mut self, trade: &Trade) -> bool {
        self.observe(trade.id)
    }

    /// Duplicates rejected so far
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sighting_is_novel() {
        let mut dedup = Deduplicator::new(10);
        assert!(dedup.observe(1));
        assert!(dedup.observe(2));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn test_repeat_is_duplicate() {
        let mut dedup = Deduplicator::new(10);
        assert!(dedup.observe(7));
        assert!(!dedup.observe(7));
        assert!(!dedup.observe(7));
        assert_eq!(dedup.duplicates(), 2);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut dedup = Deduplicator::new(3);
        for id in 0..100 {
            dedup.observe(id);
        }
        assert_eq!(dedup.len(), 3);
    }

    #[test]
    fn test_replay_from_before_window_is_duplicate() {
        let mut dedup = Deduplicator::new(3);
        for id in 1..=5 {
            assert!(dedup.observe(id));
        }
        // 1 and 2 were evicted; a reconnect replaying them must not re-admit them
        assert!(!dedup.observe(1));
        assert!(!dedup.observe(2));
        assert!(!dedup.observe(4));
    }

    #[test]
    fn test_slightly_out_of_order_ids_inside_window() {
        let mut dedup = Deduplicator::new(5);
        assert!(dedup.observe(10));
        assert!(dedup.observe(12));
        assert!(dedup.observe(11));
        assert!(!dedup.observe(12));
    }

    #[test]
    fn test_delayed_trade_past_window_reads_as_duplicate() {
        let mut dedup = Deduplicator::new(1);
        assert!(dedup.observe(10));
        assert!(dedup.observe(20));
        assert!(dedup.observe(30));
        // 15 was never seen, but it is older than the evicted 20
        assert!(!dedup.observe(15));
    }
}
