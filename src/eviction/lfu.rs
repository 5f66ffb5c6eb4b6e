//! The 24-bit LFU access-tracking field (`spec.md` 3/4.4): 16 bits of
//! last-decrement time in minutes, packed with an 8-bit logarithmic
//! counter.
//!
//! Open question resolved in `DESIGN.md`: the counter is decayed
//! first, then the probabilistic increment is evaluated against the
//! *decayed* value ("post-decay"), so a long-idle key's stale high
//! counter doesn't suppress the very access that should start raising
//! it again.

use crate::clock::Clock;

/// Counter values below this always increment; above it, increments
/// become logarithmically less likely.
const LFU_INIT_VAL: u8 = 5;
/// Higher values flatten the increment curve (slower to saturate).
const LFU_LOG_FACTOR: f64 = 10.0;
/// Minutes of idleness before the counter is docked by one.
const DEFAULT_DECAY_MINUTES: i64 = 1;

/// The packed 24-bit field: 16-bit minute timestamp + 8-bit counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LfuState {
    last_decrement_minutes: u16,
    counter: u8,
}

impl LfuState {
    /// A freshly-written key's initial state.
    pub fn fresh(clock: &dyn Clock) -> Self {
        LfuState {
            last_decrement_minutes: (clock.now_minutes() & 0xFFFF) as u16,
            counter: LFU_INIT_VAL,
        }
    }

    /// Decode from the raw 24-bit representation (top byte of the
    /// `u32` unused), as it would be packed in a value's metadata.
    pub fn from_raw(raw: u32) -> Self {
        LfuState {
            last_decrement_minutes: (raw >> 8) as u16,
            counter: (raw & 0xFF) as u8,
        }
    }

    /// Pack back into the raw 24-bit representation.
    pub fn to_raw(self) -> u32 {
        ((self.last_decrement_minutes as u32) << 8) | self.counter as u32
    }

    /// Current counter value without touching decay or time.
    pub fn counter(self) -> u8 {
        self.counter
    }

    fn minutes_elapsed(self, now_minutes: i64) -> i64 {
        let now16 = (now_minutes & 0xFFFF) as u16;
        now16.wrapping_sub(self.last_decrement_minutes) as i64
    }

    /// Apply time decay: dock the counter by `elapsed / decay_minutes`,
    /// clamped at zero, and advance the timestamp to `now`.
    pub fn decay(self, now_minutes: i64, decay_minutes: i64) -> Self {
        let decay_minutes = decay_minutes.max(1);
        let elapsed = self.minutes_elapsed(now_minutes);
        if elapsed <= 0 {
            return self;
        }
        let periods = elapsed / decay_minutes;
        let counter = self.counter.saturating_sub(periods.min(u8::MAX as i64) as u8);
        LfuState {
            last_decrement_minutes: (now_minutes & 0xFFFF) as u16,
            counter,
        }
    }

    /// Record an access: decay first (`now`, `decay_minutes`), then
    /// probabilistically increment using `rand` in `[0, 1)`.
    pub fn accessed(self, now_minutes: i64, decay_minutes: i64, rand: f64) -> Self {
        let decayed = self.decay(now_minutes, decay_minutes);
        if decayed.counter == u8::MAX {
            return decayed;
        }
        let base = (decayed.counter.saturating_sub(LFU_INIT_VAL)) as f64;
        let p = 1.0 / (base * LFU_LOG_FACTOR + 1.0);
        if rand < p {
            LfuState {
                counter: decayed.counter + 1,
                ..decayed
            }
        } else {
            decayed
        }
    }

    /// Eviction score: higher counter survives longer, so the score
    /// (lower sorts first for eviction) is the inverted counter.
    pub fn eviction_score(self, now_minutes: i64, decay_minutes: i64) -> u8 {
        255 - self.decay(now_minutes, decay_minutes).counter
    }
}

/// Convenience wrapping the library default decay period.
pub fn default_decay_minutes() -> i64 {
    DEFAULT_DECAY_MINUTES
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn raw_round_trips() {
        let state = LfuState {
            last_decrement_minutes: 1234,
            counter: 77,
        };
        assert_eq!(LfuState::from_raw(state.to_raw()), state);
    }

    #[test]
    fn decay_docks_one_counter_per_period() {
        let clock = ManualClock::new(0);
        let state = LfuState::fresh(&clock);
        clock.advance(5 * 60_000);
        let decayed = state.decay(clock.now_minutes(), 1);
        assert_eq!(decayed.counter(), state.counter().saturating_sub(5));
    }

    #[test]
    fn decay_never_goes_negative() {
        let state = LfuState {
            last_decrement_minutes: 0,
            counter: 2,
        };
        let decayed = state.decay(1000, 1);
        assert_eq!(decayed.counter(), 0);
    }

    #[test]
    fn low_counters_always_increment() {
        let state = LfuState {
            last_decrement_minutes: 0,
            counter: LFU_INIT_VAL,
        };
        let next = state.accessed(0, 1, 0.999);
        assert_eq!(next.counter(), LFU_INIT_VAL + 1);
    }

    #[test]
    fn high_counters_increment_probabilistically() {
        let state = LfuState {
            last_decrement_minutes: 0,
            counter: 200,
        };
        let unchanged = state.accessed(0, 1, 0.999999);
        assert_eq!(unchanged.counter(), 200);
        let incremented = state.accessed(0, 1, 0.0);
        assert_eq!(incremented.counter(), 201);
    }

    #[test]
    fn eviction_score_inverts_counter() {
        let state = LfuState {
            last_decrement_minutes: 0,
            counter: 10,
        };
        assert_eq!(state.eviction_score(0, 1), 245);
    }
}
