//! Epoch-based leader election (`spec.md` 4.5.6): the observer that
//! first detects ODOWN requests a vote for a new epoch; whichever
//! candidate gets a strict majority of observers in that epoch becomes
//! the one allowed to drive the failover.
//!
//! Grounded on the teacher's Raft-style `enterprise/cluster` election
//! path, simplified to the single-round, no-log-replication form this
//! domain calls for: sentinels vote once per epoch, not on an ongoing
//! replicated log.

use std::collections::HashMap;

/// One observer's voting state for a single election epoch.
#[derive(Debug, Default)]
pub struct Election {
    current_epoch: u64,
    voted_for: HashMap<u64, String>,
    votes_received: HashMap<u64, HashMap<String, String>>,
}

impl Election {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    /// Start a new epoch and vote for ourselves as candidate.
    pub fn start_epoch(&mut self, self_run_id: &str) -> u64 {
        self.current_epoch += 1;
        self.voted_for.insert(self.current_epoch, self_run_id.to_string());
        self.votes_received
            .entry(self.current_epoch)
            .or_default()
            .insert(self_run_id.to_string(), self_run_id.to_string());
        self.current_epoch
    }

    /// Respond to a vote request for `epoch`/`candidate`. An observer
    /// votes for at most one candidate per epoch; requests for an
    /// epoch it already voted in are rejected unless the candidate
    /// matches its existing vote (idempotent retries succeed).
    pub fn request_vote(&mut self, epoch: u64, candidate_run_id: &str) -> bool {
        if epoch < self.current_epoch {
            return false;
        }
        if epoch > self.current_epoch {
            self.current_epoch = epoch;
        }
        match self.voted_for.get(&epoch) {
            Some(existing) => existing == candidate_run_id,
            None => {
                self.voted_for.insert(epoch, candidate_run_id.to_string());
                true
            }
        }
    }

    /// Record a vote granted by `voter_run_id` in `epoch` for whichever
    /// candidate it actually voted for.
    pub fn record_vote(&mut self, epoch: u64, voter_run_id: &str, voted_for_candidate: &str) {
        log::info!("vote cast: epoch {epoch}, {voter_run_id} -> {voted_for_candidate}");
        self.votes_received
            .entry(epoch)
            .or_default()
            .insert(voter_run_id.to_string(), voted_for_candidate.to_string());
    }

    /// Whether `candidate_run_id` has a strict majority of
    /// `known_observers` in `epoch`. Does not by itself decide the
    /// election: `spec.md` 4.5.6 also requires at least `quorum` votes,
    /// checked separately by [`Election::has_won`].
    pub fn has_majority(&self, epoch: u64, candidate_run_id: &str, known_observers: usize) -> bool {
        self.vote_count(epoch, candidate_run_id) * 2 > known_observers
    }

    fn vote_count(&self, epoch: u64, candidate_run_id: &str) -> usize {
        self.votes_received
            .get(&epoch)
            .map(|votes| votes.values().filter(|v| v.as_str() == candidate_run_id).count())
            .unwrap_or(0)
    }

    /// The election winner per `spec.md` 4.5.6: strictly more than half
    /// of `known_observers` (self-inclusive) *and* at least `quorum`
    /// votes for the same candidate.
    pub fn has_won(&self, epoch: u64, candidate_run_id: &str, known_observers: usize, quorum: usize) -> bool {
        self.has_majority(epoch, candidate_run_id, known_observers)
            && self.vote_count(epoch, candidate_run_id) >= quorum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_an_epoch_advances_and_self_votes() {
        let mut election = Election::new();
        let epoch = election.start_epoch("me");
        assert_eq!(epoch, 1);
        assert!(election.has_majority(1, "me", 1));
    }

    #[test]
    fn an_observer_only_votes_once_per_epoch() {
        let mut election = Election::new();
        assert!(election.request_vote(5, "a"));
        assert!(!election.request_vote(5, "b"));
        assert!(election.request_vote(5, "a")); // idempotent retry
    }

    #[test]
    fn majority_requires_more_than_half_of_known_observers() {
        let mut election = Election::new();
        election.start_epoch("me");
        election.record_vote(1, "peer-1", "me");
        assert!(!election.has_majority(1, "me", 5)); // 2 of 5, not majority
        election.record_vote(1, "peer-2", "me");
        assert!(election.has_majority(1, "me", 5)); // 3 of 5
    }

    #[test]
    fn winning_also_requires_at_least_quorum_votes() {
        let mut election = Election::new();
        election.start_epoch("me"); // self-vote: 1
        election.record_vote(1, "peer-1", "me"); // 2 of 3 known: majority
        assert!(election.has_majority(1, "me", 3));
        assert!(!election.has_won(1, "me", 3, 3)); // quorum 3 not yet met
        election.record_vote(1, "peer-2", "me");
        assert!(election.has_won(1, "me", 3, 3));
    }

    #[test]
    fn stale_epoch_vote_requests_are_rejected() {
        let mut election = Election::new();
        election.request_vote(10, "a");
        assert!(!election.request_vote(3, "b"));
    }
}
