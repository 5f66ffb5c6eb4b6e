//! The eviction engine (`spec.md` 4.4): sampled approximate LRU/LFU/TTL
//! eviction backed by the fixed-size pool in [`pool`].
//!
//! Grounded on the teacher's `enterprise/cache/strategy.rs`, which
//! picks among several named cache strategies behind one trait object;
//! here the seam is [`EvictionTarget`], the abstract view over
//! whatever owns the actual key table (`spec.md` 1 keeps storage
//! itself out of scope).

pub mod config;
pub mod lfu;
pub mod pool;

pub use config::{EvictionConfig, EvictionPolicy};
pub use lfu::LfuState;
pub use pool::{EvictionPool, PoolEntry};

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::notify::{EventClass, NotificationSink};

/// The data the eviction engine needs from whatever owns the key
/// table, and the one mutation it's allowed to perform (removal).
pub trait EvictionTarget {
    /// Bytes currently used, compared against
    /// [`EvictionConfig::max_memory_bytes`].
    fn used_memory(&self) -> u64;

    /// Draw up to `n` keys at random, restricted to keys with a TTL
    /// when `volatile_only` is set. May return fewer than `n`.
    fn sample_keys(&self, n: usize, volatile_only: bool) -> Vec<Vec<u8>>;

    /// Coarse idle time in milliseconds, for LRU scoring. `None` if
    /// the key no longer exists.
    fn idle_ms(&self, key: &[u8]) -> Option<u64>;

    /// Raw packed LFU field, for LFU scoring.
    fn lfu_raw(&self, key: &[u8]) -> Option<u32>;

    /// Absolute expiry time in epoch milliseconds, for TTL scoring.
    /// `None` if the key has no TTL.
    fn expire_at_ms(&self, key: &[u8]) -> Option<i64>;

    /// Remove `key`, returning the bytes freed, or `None` if it no
    /// longer exists (the sample went stale).
    fn remove(&mut self, key: &[u8]) -> Option<u64>;
}

/// A `rand`-backed source suitable for [`free_if_needed`]'s `rand`
/// parameter in production; tests typically supply a fixed closure
/// instead for determinism.
pub fn thread_rng_source() -> impl FnMut() -> f64 {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    move || rng.gen::<f64>()
}

fn score_for(
    policy: EvictionPolicy,
    target: &dyn EvictionTarget,
    key: &[u8],
    clock: &dyn Clock,
    lfu_decay_minutes: i64,
) -> Option<u64> {
    match policy {
        EvictionPolicy::AllKeysLru | EvictionPolicy::VolatileLru => {
            // 24-bit wraparound coarse clock per `spec.md` 3.
            target.idle_ms(key).map(|idle| idle & 0x00FF_FFFF)
        }
        EvictionPolicy::AllKeysLfu | EvictionPolicy::VolatileLfu => {
            target.lfu_raw(key).map(|raw| {
                LfuState::from_raw(raw).eviction_score(clock.now_minutes(), lfu_decay_minutes) as u64
            })
        }
        EvictionPolicy::VolatileTtl => target
            .expire_at_ms(key)
            .map(|at| u64::MAX - at.max(0) as u64),
        EvictionPolicy::AllKeysRandom | EvictionPolicy::VolatileRandom | EvictionPolicy::NoEviction => None,
    }
}

/// Run one or more eviction rounds until `target.used_memory()` is at
/// or below `config.max_memory_bytes`, or `config.max_rounds` is hit.
/// Returns the number of keys evicted. `rand` draws from `[0, 1)` and
/// is used only by random policies to pick a sampled key.
pub fn free_if_needed(
    target: &mut dyn EvictionTarget,
    config: &EvictionConfig,
    clock: &dyn Clock,
    sink: &dyn NotificationSink,
    db: usize,
    mut rand: impl FnMut() -> f64,
) -> CoreResult<usize> {
    if config.policy == EvictionPolicy::NoEviction {
        return if target.used_memory() > config.max_memory_bytes {
            Err(CoreError::CapacityExceeded)
        } else {
            Ok(0)
        };
    }

    let mut pool = EvictionPool::new();
    let mut evicted = 0usize;
    let mut rounds = 0usize;
    let started_over = target.used_memory().saturating_sub(config.max_memory_bytes);
    if started_over > 0 {
        log::info!("eviction loop start: {started_over} bytes over budget, policy {:?}", config.policy);
    }

    while target.used_memory() > config.max_memory_bytes {
        if rounds >= config.max_rounds {
            break;
        }
        rounds += 1;

        let sampled = target.sample_keys(config.sample_size, config.policy.volatile_only());
        if sampled.is_empty() {
            break;
        }

        let victim = if config.policy.is_random() {
            let idx = (rand() * sampled.len() as f64) as usize;
            sampled.get(idx.min(sampled.len() - 1)).cloned()
        } else {
            for key in &sampled {
                if let Some(score) = score_for(config.policy, target, key, clock, config.lfu_decay_minutes) {
                    pool.offer(key.clone(), score);
                }
            }
            pool.take_best().map(|entry| entry.key)
        };

        let Some(key) = victim else { break };

        match target.remove(&key) {
            Some(_freed) => {
                evicted += 1;
                sink.notify(EventClass::Evicted, db, "evicted", &key);
            }
            None => {
                pool.discard(&key);
            }
        }
    }

    if target.used_memory() > config.max_memory_bytes {
        log::warn!("eviction loop stop: still {} bytes over budget after {evicted} evictions", target.used_memory() - config.max_memory_bytes);
        Err(CoreError::CapacityExceeded)
    } else {
        if started_over > 0 {
            log::info!("eviction loop stop: {evicted} keys evicted, now under budget");
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::notify::NullSink;
    use std::collections::HashMap;

    struct FakeTarget {
        entries: HashMap<Vec<u8>, (u64, u64, Option<i64>)>, // bytes, idle_ms, ttl
    }

    impl EvictionTarget for FakeTarget {
        fn used_memory(&self) -> u64 {
            self.entries.values().map(|(b, _, _)| b).sum()
        }
        fn sample_keys(&self, n: usize, volatile_only: bool) -> Vec<Vec<u8>> {
            self.entries
                .iter()
                .filter(|(_, (_, _, ttl))| !volatile_only || ttl.is_some())
                .take(n)
                .map(|(k, _)| k.clone())
                .collect()
        }
        fn idle_ms(&self, key: &[u8]) -> Option<u64> {
            self.entries.get(key).map(|(_, idle, _)| *idle)
        }
        fn lfu_raw(&self, _key: &[u8]) -> Option<u32> {
            None
        }
        fn expire_at_ms(&self, key: &[u8]) -> Option<i64> {
            self.entries.get(key).and_then(|(_, _, ttl)| *ttl)
        }
        fn remove(&mut self, key: &[u8]) -> Option<u64> {
            self.entries.remove(key).map(|(b, _, _)| b)
        }
    }

    #[test]
    fn no_eviction_policy_rejects_when_over_budget() {
        let mut target = FakeTarget { entries: HashMap::new() };
        target.entries.insert(b"a".to_vec(), (100, 0, None));
        let config = EvictionConfig {
            policy: EvictionPolicy::NoEviction,
            max_memory_bytes: 10,
            ..EvictionConfig::default()
        };
        let result = free_if_needed(&mut target, &config, &SystemClock, &NullSink, 0, || 0.0);
        assert_eq!(result, Err(CoreError::CapacityExceeded));
    }

    #[test]
    fn lru_policy_evicts_the_most_idle_key_first() {
        let mut target = FakeTarget { entries: HashMap::new() };
        target.entries.insert(b"hot".to_vec(), (50, 10, None));
        target.entries.insert(b"cold".to_vec(), (50, 99_999, None));
        let config = EvictionConfig {
            policy: EvictionPolicy::AllKeysLru,
            max_memory_bytes: 50,
            sample_size: 10,
            ..EvictionConfig::default()
        };
        let evicted = free_if_needed(&mut target, &config, &SystemClock, &NullSink, 0, || 0.0).unwrap();
        assert_eq!(evicted, 1);
        assert!(!target.entries.contains_key(b"cold".as_slice()));
        assert!(target.entries.contains_key(b"hot".as_slice()));
    }

    #[test]
    fn volatile_policies_skip_keys_without_a_ttl() {
        let mut target = FakeTarget { entries: HashMap::new() };
        target.entries.insert(b"no-ttl".to_vec(), (100, 0, None));
        let config = EvictionConfig {
            policy: EvictionPolicy::VolatileLru,
            max_memory_bytes: 10,
            sample_size: 10,
            max_rounds: 3,
            ..EvictionConfig::default()
        };
        let result = free_if_needed(&mut target, &config, &SystemClock, &NullSink, 0, || 0.0);
        assert_eq!(result, Err(CoreError::CapacityExceeded));
        assert!(target.entries.contains_key(b"no-ttl".as_slice()));
    }
}
