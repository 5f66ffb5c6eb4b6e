//! Eviction policy selection and tuning (`spec.md` 4.4).

/// Which keys are eligible, and by what notion of "worst", when memory
/// pressure requires freeing something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Reject writes instead of evicting (`CoreError::CapacityExceeded`).
    NoEviction,
    AllKeysLru,
    AllKeysLfu,
    AllKeysRandom,
    VolatileLru,
    VolatileLfu,
    VolatileRandom,
    VolatileTtl,
}

impl EvictionPolicy {
    /// True if only keys with a TTL are eligible.
    pub fn volatile_only(self) -> bool {
        matches!(
            self,
            EvictionPolicy::VolatileLru
                | EvictionPolicy::VolatileLfu
                | EvictionPolicy::VolatileRandom
                | EvictionPolicy::VolatileTtl
        )
    }

    /// True if eviction should pick uniformly at random rather than
    /// scoring and pooling candidates.
    pub fn is_random(self) -> bool {
        matches!(self, EvictionPolicy::AllKeysRandom | EvictionPolicy::VolatileRandom)
    }
}

/// Tuning knobs for the eviction loop.
#[derive(Debug, Clone, Copy)]
pub struct EvictionConfig {
    pub policy: EvictionPolicy,
    /// Memory budget; eviction runs while usage exceeds this.
    pub max_memory_bytes: u64,
    /// Candidates drawn per sampling round (`spec.md` 4.4 default: 5).
    pub sample_size: usize,
    /// Minutes between LFU counter decrements.
    pub lfu_decay_minutes: i64,
    /// Hard stop on eviction rounds per `free_if_needed` call, guarding
    /// against spinning forever if the target can't actually shed
    /// enough memory (e.g. every sampled key is pinned).
    pub max_rounds: usize,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        EvictionConfig {
            policy: EvictionPolicy::NoEviction,
            max_memory_bytes: u64::MAX,
            sample_size: 5,
            lfu_decay_minutes: super::lfu::default_decay_minutes(),
            max_rounds: 10_000,
        }
    }
}
