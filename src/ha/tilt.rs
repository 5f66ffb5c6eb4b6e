//! TILT mode (`spec.md` 4.5.8): a safety catch for when the
//! supervisor's own clock jumps (a paused VM, a suspended laptop, NTP
//! stepping the clock), which would otherwise be indistinguishable
//! from every monitored instance going down at once.

use std::time::Duration;

/// A clock jump larger than this, in either direction, between two
/// consecutive scheduler ticks trips TILT mode.
const TILT_TRIGGER_MS: i64 = 2_000;

/// While tilted, failure detection is suspended for this long after
/// the last jump, giving the clock time to settle.
const TILT_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
pub struct TiltGuard {
    last_tick_ms: Option<i64>,
    tilted_until_ms: Option<i64>,
}

impl TiltGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current wall-clock time at a scheduler tick. Returns
    /// `true` if this tick just triggered TILT mode. Per `spec.md`
    /// 4.5.8, *any* negative delta trips TILT (the clock must never
    /// appear to run backward), while a forward jump only trips it
    /// once it exceeds the trigger threshold.
    pub fn tick(&mut self, now_ms: i64) -> bool {
        let triggered = match self.last_tick_ms {
            Some(prev) => {
                let delta = now_ms - prev;
                delta < 0 || delta > TILT_TRIGGER_MS
            }
            None => false,
        };
        self.last_tick_ms = Some(now_ms);
        if triggered {
            self.tilted_until_ms = Some(now_ms + TILT_PERIOD.as_millis() as i64);
        }
        triggered
    }

    /// Whether failure detection and failover should be suspended
    /// right now.
    pub fn is_tilted(&self, now_ms: i64) -> bool {
        matches!(self.tilted_until_ms, Some(until) if now_ms < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_ticks_never_trigger_tilt() {
        let mut guard = TiltGuard::new();
        for ms in (0..10_000).step_by(1_000) {
            assert!(!guard.tick(ms));
            assert!(!guard.is_tilted(ms));
        }
    }

    #[test]
    fn a_large_jump_trips_tilt_for_the_full_period() {
        let mut guard = TiltGuard::new();
        guard.tick(0);
        assert!(guard.tick(20_000));
        assert!(guard.is_tilted(20_500));
        assert!(!guard.is_tilted(20_000 + 30_001));
    }

    #[test]
    fn a_jump_backward_also_trips_tilt() {
        let mut guard = TiltGuard::new();
        guard.tick(100_000);
        assert!(guard.tick(50_000));
        assert!(guard.is_tilted(50_100));
    }
}
