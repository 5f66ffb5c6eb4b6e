//! The HA supervisor (`spec.md` 4.5): observer/master/replica topology
//! tracking, SDOWN/ODOWN detection, epoch-based election, and
//! failover orchestration, wired together as one async actor.
//!
//! Unlike the rest of the crate's data plane (`spec.md` 5), this
//! component genuinely needs non-blocking peer I/O and timers, so it
//! is the one place `tokio` runs — grounded on the teacher's
//! `enterprise/cluster/mod.rs` `ClusterManager`, which orchestrates
//! several sub-managers (`Raft`, `Membership`, `Replication`,
//! `Failover`, `LoadBalancer`) behind one async entry point the same
//! way `Supervisor` orchestrates `Election`/`Failover`/`TiltGuard`/
//! `LinkTable` here.

pub mod config;
pub mod election;
pub mod failover;
pub mod failure;
pub mod hello;
pub mod instance;
pub mod tilt;
pub mod transport;

pub use config::SupervisorConfig;
pub use failover::{Failover, FailoverEvent, FailoverState};
pub use hello::{HelloMessage, HelloOutcome};
pub use instance::{AddressBook, HealthState, Instance, Role};

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use election::Election;
use failure::QuorumPoll;
use std::sync::Arc;
use tilt::TiltGuard;
use tokio::sync::{broadcast, RwLock};
use transport::{LinkTable, PeerTransport};

/// A supervisor-level notification, distinct from [`crate::notify`]'s
/// keyspace events: these describe the supervisor's own state, for
/// operational observability rather than client pub/sub
/// (`spec.md`'s supplemented `subscribe_events` feature).
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    MasterSDown,
    MasterODown,
    ElectionWon { epoch: u64 },
    Failover(FailoverEvent),
}

/// Orchestrates the full HA lifecycle for one monitored master.
pub struct Supervisor {
    self_run_id: String,
    config: SupervisorConfig,
    clock: Arc<dyn Clock>,
    transport: Arc<dyn PeerTransport>,
    links: LinkTable,
    book: RwLock<AddressBook>,
    poll: RwLock<QuorumPoll>,
    election: RwLock<Election>,
    tilt: RwLock<TiltGuard>,
    active_failover: RwLock<Option<Failover>>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor {
    /// Generate a fresh run-id, the way a newly-started observer
    /// would mint its own identity before its first HELLO.
    pub fn generate_run_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn new(
        self_run_id: impl Into<String>,
        config: SupervisorConfig,
        clock: Arc<dyn Clock>,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Supervisor {
            self_run_id: self_run_id.into(),
            config,
            clock,
            transport,
            links: LinkTable::new(),
            book: RwLock::new(AddressBook::new()),
            poll: RwLock::new(QuorumPoll::new()),
            election: RwLock::new(Election::new()),
            tilt: RwLock::new(TiltGuard::new()),
            active_failover: RwLock::new(None),
            events,
        }
    }

    /// Subscribe to the supervisor's own event stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    /// Fold an incoming HELLO message into the tracked topology.
    pub async fn handle_hello(&self, hello: &HelloMessage) -> HelloOutcome {
        let mut book = self.book.write().await;
        let known_epoch = self.config.config_epoch;
        self::hello::process_hello(&mut book, known_epoch, hello)
    }

    /// One scheduler tick: checks the clock for TILT, pings the
    /// master link, and updates SDOWN/ODOWN state. Returns the
    /// resulting health state.
    pub async fn tick(&self, master_addr: std::net::SocketAddr) -> CoreResult<HealthState> {
        let now_ms = self.clock.now_ms();
        let tilted = {
            let mut tilt = self.tilt.write().await;
            tilt.tick(now_ms);
            tilt.is_tilted(now_ms)
        };
        if tilted {
            return Ok(HealthState::Healthy);
        }

        let ping_result = self.transport.ping(master_addr).await;
        let last_reply_ms_ago = match &ping_result {
            Ok(()) => {
                self.links.mark_up(master_addr).await;
                0
            }
            Err(_) => {
                self.links.mark_down(master_addr).await;
                self.config.down_after.as_millis() as u64
            }
        };

        let self_sdown = failure::is_sdown(last_reply_ms_ago, self.config.down_after);
        let poll = self.poll.read().await;
        let health = failure::resolve_health(self_sdown, &poll, self.config.quorum);

        match health {
            HealthState::SDown => {
                log::warn!("master at {master_addr} is now SDOWN");
                let _ = self.events.send(SupervisorEvent::MasterSDown);
            }
            HealthState::ODown => {
                log::warn!("master at {master_addr} is now ODOWN (quorum reached)");
                let _ = self.events.send(SupervisorEvent::MasterODown);
            }
            HealthState::Healthy => {}
        }

        Ok(health)
    }

    /// Record a peer's `is-master-down-by-addr` reply.
    pub async fn record_peer_vote(&self, observer_run_id: &str, down: bool) {
        self.poll.write().await.record(observer_run_id, down);
    }

    /// Start (or continue) the election for a new epoch, requesting
    /// our own candidacy.
    pub async fn start_election(&self) -> u64 {
        let epoch = self.election.write().await.start_epoch(&self.self_run_id);
        log::info!("epoch advanced to {epoch}, requesting self-candidacy");
        epoch
    }

    /// Record a vote cast by a peer observer for a candidate in
    /// `epoch`.
    pub async fn record_vote(&self, epoch: u64, voter_run_id: &str, voted_for: &str) {
        self.election.write().await.record_vote(epoch, voter_run_id, voted_for);
    }

    /// Whether we've won the election for `epoch`: a strict majority of
    /// `known_observers` *and* at least `quorum` votes (`spec.md`
    /// 4.5.6).
    pub async fn has_won_election(&self, epoch: u64, known_observers: usize) -> bool {
        let won = self.election.read().await.has_won(
            epoch,
            &self.self_run_id,
            known_observers,
            self.config.quorum,
        );
        if won {
            let _ = self.events.send(SupervisorEvent::ElectionWon { epoch });
        }
        won
    }

    /// Begin driving a failover for `epoch`, replacing any prior
    /// (presumably abandoned) attempt.
    pub async fn begin_failover(&self, epoch: u64) {
        let now_ms = self.clock.now_ms();
        let mut failover = Failover::start(epoch, now_ms, self.config.failover_timeout);
        failover.begin_selection();
        *self.active_failover.write().await = Some(failover);
    }

    /// Advance the active failover with a ranked candidate list,
    /// publishing the resulting transition on the event stream.
    pub async fn advance_failover_with_candidates(&self, ranked: &[Instance]) -> CoreResult<()> {
        let mut guard = self.active_failover.write().await;
        let failover = guard.as_mut().ok_or(CoreError::NotFound)?;
        let result = failover.select_replica(ranked);
        if let Some(event) = failover.events().last().cloned() {
            let _ = self.events.send(SupervisorEvent::Failover(event));
        }
        result
    }

    /// Current state of the active failover attempt, if any.
    pub async fn failover_state(&self) -> Option<FailoverState> {
        self.active_failover.read().await.as_ref().map(|f| f.state())
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use transport::FakeTransport;

    fn master_addr() -> std::net::SocketAddr {
        "127.0.0.1:6379".parse().unwrap()
    }

    fn make_supervisor() -> (Supervisor, Arc<FakeTransport>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let transport = Arc::new(FakeTransport::new());
        let config = SupervisorConfig::new("mymaster", 2);
        let supervisor = Supervisor::new(
            "me",
            config,
            clock.clone() as Arc<dyn Clock>,
            transport.clone() as Arc<dyn PeerTransport>,
        );
        (supervisor, transport, clock)
    }

    #[test]
    fn generated_run_ids_are_distinct() {
        assert_ne!(Supervisor::generate_run_id(), Supervisor::generate_run_id());
    }

    #[tokio::test]
    async fn healthy_master_ticks_without_events() {
        let (supervisor, _transport, _clock) = make_supervisor();
        let health = supervisor.tick(master_addr()).await.unwrap();
        assert_eq!(health, HealthState::Healthy);
    }

    #[tokio::test]
    async fn unreachable_master_escalates_to_sdown_then_odown_on_quorum() {
        let (supervisor, transport, _clock) = make_supervisor();
        transport.set_unreachable(master_addr());

        let health = supervisor.tick(master_addr()).await.unwrap();
        assert_eq!(health, HealthState::SDown);

        supervisor.record_peer_vote("peer-1", true).await;
        let health = supervisor.tick(master_addr()).await.unwrap();
        assert_eq!(health, HealthState::ODown);
    }

    #[tokio::test]
    async fn election_win_requires_majority_of_observers() {
        let (supervisor, _transport, _clock) = make_supervisor();
        let epoch = supervisor.start_election().await;
        assert!(!supervisor.has_won_election(epoch, 5).await);
        supervisor.record_vote(epoch, "peer-1", "me").await;
        supervisor.record_vote(epoch, "peer-2", "me").await;
        assert!(supervisor.has_won_election(epoch, 5).await);
    }

    #[tokio::test]
    async fn failover_progresses_and_is_observable_on_the_event_stream() {
        let (supervisor, _transport, _clock) = make_supervisor();
        let mut events = supervisor.subscribe_events();
        supervisor.begin_failover(1).await;

        let candidate = Instance::new(Role::Replica, master_addr(), "r1");
        supervisor.advance_failover_with_candidates(&[candidate]).await.unwrap();

        assert_eq!(supervisor.failover_state().await, Some(FailoverState::SendPromote));
        let event = events.recv().await.unwrap();
        assert!(matches!(event, SupervisorEvent::Failover(_)));
    }

    #[tokio::test]
    async fn a_clock_jump_suspends_detection_for_that_tick() {
        let (supervisor, transport, clock) = make_supervisor();
        transport.set_unreachable(master_addr());
        supervisor.tick(master_addr()).await.unwrap();
        clock.advance(60_000); // large jump trips TiltGuard
        let health = supervisor.tick(master_addr()).await.unwrap();
        assert_eq!(health, HealthState::Healthy);
    }
}
