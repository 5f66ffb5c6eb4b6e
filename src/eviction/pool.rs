//! The fixed-size eviction pool (`spec.md` 4.4): a small candidate set
//! kept ascending by score across sampling rounds, so a single round's
//! sample doesn't have to contain the true global worst key.

/// Fixed capacity shared by every pool regardless of policy.
pub const POOL_CAPACITY: usize = 16;

/// One candidate slot: a key and the score that ordered it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    pub key: Vec<u8>,
    pub score: u64,
}

/// Ascending-by-score candidate pool. Higher score means "more
/// eligible for eviction" uniformly across LRU/LFU/TTL policies (each
/// policy is responsible for mapping its own notion of "worst" onto
/// this convention before calling [`EvictionPool::offer`]) — idle
/// milliseconds, `255 - lfu counter`, and `u64::MAX - expire_at_ms` all
/// grow as a key becomes more worth evicting.
#[derive(Debug, Default)]
pub struct EvictionPool {
    entries: Vec<PoolEntry>,
}

impl EvictionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current candidates, ascending by score (the last entry is the
    /// best eviction victim).
    pub fn samples(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offer a freshly-sampled key. Existing entries for the same key
    /// are replaced in place (a key can only occupy one pool slot);
    /// otherwise the candidate is inserted in ascending position and
    /// the pool is truncated back to [`POOL_CAPACITY`], dropping
    /// whichever entry now has the lowest score (the candidate least
    /// worth evicting).
    pub fn offer(&mut self, key: Vec<u8>, score: u64) {
        if let Some(pos) = self.entries.iter().position(|e| e.key == key) {
            self.entries.remove(pos);
        }
        let pos = self.entries.partition_point(|e| e.score <= score);
        self.entries.insert(pos, PoolEntry { key, score });
        if self.entries.len() > POOL_CAPACITY {
            self.entries.remove(0);
        }
    }

    /// Take the best (highest-score) candidate, if any, draining the
    /// pool from the tail.
    pub fn take_best(&mut self) -> Option<PoolEntry> {
        self.entries.pop()
    }

    /// Drop a candidate that no longer exists or no longer qualifies
    /// (e.g. it was written to since being sampled). A no-op if the
    /// key isn't present.
    pub fn discard(&mut self, key: &[u8]) {
        self.entries.retain(|e| e.key != key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_keeps_ascending_order() {
        let mut pool = EvictionPool::new();
        pool.offer(b"a".to_vec(), 50);
        pool.offer(b"b".to_vec(), 10);
        pool.offer(b"c".to_vec(), 30);
        let scores: Vec<u64> = pool.samples().iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![10, 30, 50]);
    }

    #[test]
    fn offer_replaces_existing_entry_for_same_key() {
        let mut pool = EvictionPool::new();
        pool.offer(b"a".to_vec(), 50);
        pool.offer(b"a".to_vec(), 5);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.samples()[0].score, 5);
    }

    #[test]
    fn pool_truncates_to_capacity_dropping_the_least_evictable() {
        let mut pool = EvictionPool::new();
        for i in 0..(POOL_CAPACITY + 5) {
            pool.offer(format!("k{i}").into_bytes(), i as u64);
        }
        assert_eq!(pool.len(), POOL_CAPACITY);
        // The five lowest scores (0..5) were dropped; the surviving
        // window is the POOL_CAPACITY highest scores, still ascending.
        assert_eq!(pool.samples().first().unwrap().score, 5);
        assert_eq!(pool.samples().last().unwrap().score, (POOL_CAPACITY + 4) as u64);
    }

    #[test]
    fn take_best_drains_the_highest_score_from_the_tail() {
        let mut pool = EvictionPool::new();
        pool.offer(b"a".to_vec(), 50);
        pool.offer(b"b".to_vec(), 10);
        let best = pool.take_best().unwrap();
        assert_eq!(best.key, b"a");
        assert_eq!(pool.len(), 1);
    }
}
