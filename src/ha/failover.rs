//! The failover state machine (`spec.md` 4.5.7): once a master is
//! ODOWN and this observer has won the election for the current
//! epoch, walk it through replica selection, promotion, and
//! reconfiguration.
//!
//! Grounded on the teacher's `enterprise/cluster/failover.rs`
//! `FailoverManager`/`FailoverEvent` shape: a small enum state plus an
//! event log, rather than a callback chain.

use super::instance::Instance;
use crate::error::{CoreError, CoreResult};
use std::time::Duration;

/// States of one failover attempt, in the order `spec.md` 4.5.7 walks
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverState {
    WaitStart,
    SelectReplica,
    SendPromote,
    WaitPromotion,
    ReconfReplicas,
    UpdateConfig,
    Done,
    Failed,
}

/// An observable transition, for the supervisor's event stream
/// (`spec.md`'s supplemented `subscribe_events`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverEvent {
    pub epoch: u64,
    pub from: FailoverState,
    pub to: FailoverState,
    pub detail: String,
}

/// Rank candidates by replication offset (descending: most caught-up
/// first), then by run_id for a stable tie-break
/// (`spec.md` 4.5.7's candidate-selection rule).
pub fn rank_candidates(mut candidates: Vec<(Instance, u64)>) -> Vec<Instance> {
    candidates.sort_by(|(a_inst, a_off), (b_inst, b_off)| {
        b_off.cmp(a_off).then_with(|| a_inst.run_id.cmp(&b_inst.run_id))
    });
    candidates.into_iter().map(|(inst, _)| inst).collect()
}

/// Drives one failover attempt forward one step at a time; the
/// supervisor's scheduler loop calls [`Failover::advance`] on each
/// tick rather than this type spawning its own task, keeping the
/// state machine itself synchronous and unit-testable.
#[derive(Debug)]
pub struct Failover {
    pub epoch: u64,
    state: FailoverState,
    promoted_replica: Option<Instance>,
    started_at_ms: i64,
    failover_timeout: Duration,
    events: Vec<FailoverEvent>,
}

impl Failover {
    pub fn start(epoch: u64, now_ms: i64, failover_timeout: Duration) -> Self {
        Failover {
            epoch,
            state: FailoverState::WaitStart,
            promoted_replica: None,
            started_at_ms: now_ms,
            failover_timeout,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> FailoverState {
        self.state
    }

    pub fn events(&self) -> &[FailoverEvent] {
        &self.events
    }

    fn transition(&mut self, to: FailoverState, detail: impl Into<String>) {
        let detail = detail.into();
        if matches!(to, FailoverState::Failed) {
            log::warn!("failover epoch {} aborted: {} -> {:?} ({detail})", self.epoch, self.state_name(), to);
        } else {
            log::info!("failover epoch {} {} -> {:?} ({detail})", self.epoch, self.state_name(), to);
        }
        let event = FailoverEvent {
            epoch: self.epoch,
            from: self.state,
            to,
            detail,
        };
        self.state = to;
        self.events.push(event);
    }

    fn state_name(&self) -> &'static str {
        match self.state {
            FailoverState::WaitStart => "wait-start",
            FailoverState::SelectReplica => "select-replica",
            FailoverState::SendPromote => "send-promote",
            FailoverState::WaitPromotion => "wait-promotion",
            FailoverState::ReconfReplicas => "reconf-replicas",
            FailoverState::UpdateConfig => "update-config",
            FailoverState::Done => "done",
            FailoverState::Failed => "failed",
        }
    }

    fn timed_out(&self, now_ms: i64) -> bool {
        now_ms - self.started_at_ms >= self.failover_timeout.as_millis() as i64
    }

    /// Begin candidate selection once the observer is ready to act.
    pub fn begin_selection(&mut self) {
        if self.state == FailoverState::WaitStart {
            self.transition(FailoverState::SelectReplica, "selection started");
        }
    }

    /// Supply the ranked candidate list; picks the best or fails if
    /// none are available.
    pub fn select_replica(&mut self, ranked: &[Instance]) -> CoreResult<()> {
        if self.state != FailoverState::SelectReplica {
            return Err(CoreError::Busy(crate::error::BusyReason::ScriptRunning));
        }
        match ranked.first() {
            Some(chosen) => {
                self.promoted_replica = Some(chosen.clone());
                self.transition(FailoverState::SendPromote, format!("selected {}", chosen.run_id));
                Ok(())
            }
            None => {
                self.transition(FailoverState::Failed, "no eligible replica");
                Err(CoreError::NotFound)
            }
        }
    }

    /// Record that the promote command was sent; wait for the replica
    /// to report its new role.
    pub fn promote_sent(&mut self) {
        if self.state == FailoverState::SendPromote {
            self.transition(FailoverState::WaitPromotion, "promote command sent");
        }
    }

    /// The promoted replica reported `role:master`.
    pub fn promotion_confirmed(&mut self) {
        if self.state == FailoverState::WaitPromotion {
            self.transition(FailoverState::ReconfReplicas, "promotion confirmed");
        }
    }

    /// Every remaining replica has been pointed at the new master.
    pub fn replicas_reconfigured(&mut self) {
        if self.state == FailoverState::ReconfReplicas {
            self.transition(FailoverState::UpdateConfig, "replicas reconfigured");
        }
    }

    /// The config file rewrite (`spec.md` 4.5.9) completed.
    pub fn config_updated(&mut self) {
        if self.state == FailoverState::UpdateConfig {
            self.transition(FailoverState::Done, "config persisted");
        }
    }

    /// Check the wall clock against `failover-timeout`; a stalled
    /// attempt is marked `Failed` so the supervisor can start over
    /// with a fresh epoch.
    pub fn check_timeout(&mut self, now_ms: i64) -> bool {
        if matches!(self.state, FailoverState::Done | FailoverState::Failed) {
            return false;
        }
        if self.timed_out(now_ms) {
            self.transition(FailoverState::Failed, "failover-timeout exceeded");
            true
        } else {
            false
        }
    }

    pub fn promoted_replica(&self) -> Option<&Instance> {
        self.promoted_replica.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ha::instance::{HealthState, Role};
    use std::net::SocketAddr;

    fn replica(run_id: &str) -> Instance {
        Instance {
            role: Role::Replica,
            addr: "127.0.0.1:6380".parse::<SocketAddr>().unwrap(),
            run_id: run_id.to_string(),
            health: HealthState::Healthy,
            config_epoch: 0,
            last_ping_reply_ms_ago: 0,
        }
    }

    #[test]
    fn ranking_prefers_most_caught_up_replica() {
        let candidates = vec![(replica("r1"), 100), (replica("r2"), 500), (replica("r3"), 500)];
        let ranked = rank_candidates(candidates);
        assert_eq!(ranked[0].run_id, "r2"); // tie broken by run_id ascending
        assert_eq!(ranked[1].run_id, "r3");
        assert_eq!(ranked[2].run_id, "r1");
    }

    #[test]
    fn happy_path_walks_every_state_in_order() {
        let mut fo = Failover::start(1, 0, Duration::from_millis(10_000));
        fo.begin_selection();
        fo.select_replica(&[replica("r1")]).unwrap();
        fo.promote_sent();
        fo.promotion_confirmed();
        fo.replicas_reconfigured();
        fo.config_updated();
        assert_eq!(fo.state(), FailoverState::Done);
        assert_eq!(fo.promoted_replica().unwrap().run_id, "r1");
        assert_eq!(fo.events().len(), 6);
    }

    #[test]
    fn no_eligible_replica_fails_the_attempt() {
        let mut fo = Failover::start(1, 0, Duration::from_millis(10_000));
        fo.begin_selection();
        assert!(fo.select_replica(&[]).is_err());
        assert_eq!(fo.state(), FailoverState::Failed);
    }

    #[test]
    fn a_stalled_attempt_times_out() {
        let mut fo = Failover::start(1, 0, Duration::from_millis(1_000));
        fo.begin_selection();
        assert!(!fo.check_timeout(500));
        assert!(fo.check_timeout(1_000));
        assert_eq!(fo.state(), FailoverState::Failed);
    }
}
