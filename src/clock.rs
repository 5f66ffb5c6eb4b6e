//! Time as an explicit, swappable collaborator.
//!
//! `spec.md` 9 calls time a "platform wrapper": out of scope to define,
//! but the rest of the system must receive it by reference rather than
//! reach for a global. `Clock` is that seam; `SystemClock` is the only
//! production implementation, and tests supply a `ManualClock` to drive
//! TILT detection, LFU decay, and coarse-idle scoring deterministically.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of wall-clock time, expressed the way the components need it.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// Minutes since the Unix epoch, for the LFU access-time field
    /// (`spec.md` 3: "16-bit last decrement time in minutes").
    fn now_minutes(&self) -> i64 {
        self.now_ms() / 60_000
    }
}

/// The real clock, backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// A clock tests can advance explicitly, to exercise TILT detection
/// (`spec.md` 4.5.8) and LFU decay (`spec.md` 4.4) without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Create a manual clock starting at the given millisecond value.
    pub fn new(start_ms: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_ms),
        }
    }

    /// Advance the clock by `delta_ms` (may be negative, to simulate the
    /// clock jump that triggers TILT mode).
    pub fn advance(&self, delta_ms: i64) {
        self.millis.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Set the clock to an absolute millisecond value.
    pub fn set(&self, ms: i64) {
        self.millis.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.advance(-2_000);
        assert_eq!(clock.now_ms(), -500);
    }

    #[test]
    fn minutes_derive_from_millis() {
        let clock = ManualClock::new(123 * 60_000 + 999);
        assert_eq!(clock.now_minutes(), 123);
    }
}
