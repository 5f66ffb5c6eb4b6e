//! SDOWN/ODOWN detection (`spec.md` 4.5.3): an observer first suspects
//! a master on its own (subjectively down), then asks peers to
//! confirm before treating it as objectively down.

use super::instance::HealthState;
use std::collections::HashMap;
use std::time::Duration;

/// Determine subjective-down status from how long it's been since the
/// last successful PING reply.
pub fn is_sdown(last_reply_ms_ago: u64, down_after: Duration) -> bool {
    last_reply_ms_ago as u128 >= down_after.as_millis()
}

/// Tracks `is-master-down-by-addr` replies gathered from peer
/// observers while deciding whether a suspected-down master should be
/// escalated to ODOWN.
#[derive(Debug, Default)]
pub struct QuorumPoll {
    votes: HashMap<String, bool>,
}

impl QuorumPoll {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one peer's vote (`true` = that peer also sees it down).
    pub fn record(&mut self, observer_run_id: impl Into<String>, down: bool) {
        self.votes.insert(observer_run_id.into(), down);
    }

    /// Votes collected so far, including our own subjective view.
    pub fn replies(&self) -> usize {
        self.votes.len()
    }

    pub fn down_votes(&self) -> usize {
        self.votes.values().filter(|&&v| v).count()
    }

    /// Whether the accumulated votes (plus our own SDOWN verdict) meet
    /// `quorum`, triggering ODOWN.
    pub fn reaches_quorum(&self, self_sdown: bool, quorum: usize) -> bool {
        let total_down = self.down_votes() + if self_sdown { 1 } else { 0 };
        total_down >= quorum
    }
}

/// Resolve the health state for a master given our own SDOWN verdict
/// and the quorum poll gathered so far.
pub fn resolve_health(self_sdown: bool, poll: &QuorumPoll, quorum: usize) -> HealthState {
    if !self_sdown {
        HealthState::Healthy
    } else if poll.reaches_quorum(self_sdown, quorum) {
        HealthState::ODown
    } else {
        HealthState::SDown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdown_trips_once_the_timeout_elapses() {
        let timeout = Duration::from_millis(30_000);
        assert!(!is_sdown(29_999, timeout));
        assert!(is_sdown(30_000, timeout));
    }

    #[test]
    fn odown_requires_quorum_of_down_votes() {
        let mut poll = QuorumPoll::new();
        poll.record("peer-1", true);
        assert_eq!(resolve_health(true, &poll, 2), HealthState::SDown);
        poll.record("peer-2", true);
        assert_eq!(resolve_health(true, &poll, 2), HealthState::ODown);
    }

    #[test]
    fn healthy_master_never_escalates_regardless_of_stale_votes() {
        let mut poll = QuorumPoll::new();
        poll.record("peer-1", true);
        poll.record("peer-2", true);
        assert_eq!(resolve_health(false, &poll, 1), HealthState::Healthy);
    }
}
