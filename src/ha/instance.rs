//! Topology entities the supervisor tracks: masters, replicas, and
//! peer observers (`spec.md` 4.5.1), discovered via HELLO gossip
//! rather than static config alone.
//!
//! Grounded on the teacher's `enterprise/cluster/config.rs`
//! `NodeConfig`/`NodeRole`/`NodeId`.

use std::net::SocketAddr;

/// The role an instance plays in the monitored topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Replica,
    Observer,
}

/// Where a subjective-down verdict about a master stands for one
/// observer's view of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    /// Subjectively down: this observer's own PINGs have timed out.
    SDown,
    /// Objectively down: a quorum of observers agree it's down.
    ODown,
}

/// One tracked instance (a monitored master, one of its replicas, or
/// a peer observer watching the same master).
#[derive(Debug, Clone)]
pub struct Instance {
    pub role: Role,
    pub addr: SocketAddr,
    pub run_id: String,
    pub health: HealthState,
    /// Epoch of the last config change this instance is known to have
    /// adopted (`spec.md` 4.5.5's config-epoch propagation).
    pub config_epoch: u64,
    /// Milliseconds since the last successful PING reply.
    pub last_ping_reply_ms_ago: u64,
}

impl Instance {
    pub fn new(role: Role, addr: SocketAddr, run_id: impl Into<String>) -> Self {
        Instance {
            role,
            addr,
            run_id: run_id.into(),
            health: HealthState::Healthy,
            config_epoch: 0,
            last_ping_reply_ms_ago: 0,
        }
    }
}

/// The address book for one monitored master: the master itself, its
/// known replicas, and the peer observers also watching it.
///
/// `spec.md` 4.5.4 ("link sharing across masters for the same
/// observer"): a single [`Link`](super::transport::Link) may serve more
/// than one `AddressBook`, so this type holds no connection state of
/// its own, only topology.
#[derive(Debug, Default)]
pub struct AddressBook {
    pub master: Option<Instance>,
    pub replicas: Vec<Instance>,
    pub observers: Vec<Instance>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a replica by run_id.
    pub fn upsert_replica(&mut self, instance: Instance) {
        upsert(&mut self.replicas, instance);
    }

    /// Insert or update a peer observer by run_id.
    pub fn upsert_observer(&mut self, instance: Instance) {
        upsert(&mut self.observers, instance);
    }

    /// Total observers watching this master, including ourselves.
    pub fn observer_count(&self, include_self: bool) -> usize {
        self.observers.len() + if include_self { 1 } else { 0 }
    }
}

fn upsert(list: &mut Vec<Instance>, instance: Instance) {
    if let Some(existing) = list.iter_mut().find(|i| i.run_id == instance.run_id) {
        *existing = instance;
    } else {
        list.push(instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:6379".parse().unwrap()
    }

    #[test]
    fn upsert_replaces_by_run_id() {
        let mut book = AddressBook::new();
        book.upsert_replica(Instance::new(Role::Replica, addr(), "r1"));
        book.upsert_replica(Instance::new(Role::Replica, addr(), "r1"));
        assert_eq!(book.replicas.len(), 1);
    }

    #[test]
    fn observer_count_includes_self_when_asked() {
        let mut book = AddressBook::new();
        book.upsert_observer(Instance::new(Role::Observer, addr(), "o1"));
        assert_eq!(book.observer_count(false), 1);
        assert_eq!(book.observer_count(true), 2);
    }
}
