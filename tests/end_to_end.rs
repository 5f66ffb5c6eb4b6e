//! End-to-end scenarios spanning the codec, the quicklist, eviction,
//! and the HA supervisor together, rather than one module in
//! isolation.

use keyspace_core::clock::ManualClock;
use keyspace_core::eviction::{free_if_needed, EvictionConfig, EvictionPolicy, EvictionTarget};
use keyspace_core::notify::NullSink;
use keyspace_core::pack::{Pack, PackValue};
use keyspace_core::quicklist::Quicklist;
use std::collections::HashMap;
use std::sync::Arc;

#[test]
fn pack_segment_round_trips_every_integer_tier_in_one_chain() {
    let mut pack = Pack::new();
    let values: Vec<i64> = vec![0, 42, -1, -4096, 4095, 30_000, -30_000, 9_000_000, i64::MIN, i64::MAX];
    for v in &values {
        pack.append(PackValue::Int(*v)).unwrap();
    }
    pack.validate().unwrap();

    let mut decoded = Vec::new();
    let mut cur = pack.first();
    while let Some(off) = cur {
        decoded.push(i64::try_from(pack.get(off).unwrap()).unwrap());
        cur = pack.next(off);
    }
    assert_eq!(decoded, values);
}

#[test]
fn quicklist_splits_under_fill_pressure_and_merges_back_down_after_deletes() {
    let mut ql = Quicklist::new(3, 0);
    for i in 0..30 {
        ql.push_back(PackValue::ForceBytes(format!("item-{i}").as_bytes())).unwrap();
    }
    assert_eq!(ql.len(), 30);
    assert!(ql.node_count() >= 10);

    // delete every third element; surviving nodes should merge where
    // they now fit comfortably under fill.
    let mut cur = ql.front();
    let mut i = 0;
    while let Some(c) = cur {
        let next = ql.next(c);
        if i % 3 == 0 {
            ql.delete(c).unwrap();
        }
        cur = next;
        i += 1;
    }
    assert_eq!(ql.len(), 20);

    let mut collected = Vec::new();
    let mut cur = ql.front();
    while let Some(c) = cur {
        collected.push(ql.get(c).unwrap());
        cur = ql.next(c);
    }
    assert_eq!(collected.len(), 20);
}

struct MemTarget {
    entries: HashMap<Vec<u8>, (u64, u64)>, // bytes, idle_ms
}

impl EvictionTarget for MemTarget {
    fn used_memory(&self) -> u64 {
        self.entries.values().map(|(b, _)| b).sum()
    }
    fn sample_keys(&self, n: usize, _volatile_only: bool) -> Vec<Vec<u8>> {
        self.entries.keys().take(n).cloned().collect()
    }
    fn idle_ms(&self, key: &[u8]) -> Option<u64> {
        self.entries.get(key).map(|(_, idle)| *idle)
    }
    fn lfu_raw(&self, _key: &[u8]) -> Option<u32> {
        None
    }
    fn expire_at_ms(&self, _key: &[u8]) -> Option<i64> {
        None
    }
    fn remove(&mut self, key: &[u8]) -> Option<u64> {
        self.entries.remove(key).map(|(b, _)| b)
    }
}

#[test]
fn eviction_frees_the_coldest_keys_first_until_under_budget() {
    let mut target = MemTarget { entries: HashMap::new() };
    for i in 0..20 {
        target.entries.insert(format!("k{i}").into_bytes(), (10, i * 1000));
    }
    let config = EvictionConfig {
        policy: EvictionPolicy::AllKeysLru,
        max_memory_bytes: 100,
        sample_size: 20,
        ..EvictionConfig::default()
    };
    let clock = ManualClock::new(0);
    let evicted = free_if_needed(&mut target, &config, &clock, &NullSink, 0, || 0.0).unwrap();
    assert!(evicted > 0);
    assert!(target.used_memory() <= 100);
    // the coldest (highest idle_ms) keys should be gone first.
    assert!(!target.entries.contains_key(b"k19".as_slice()));
}

#[tokio::test]
async fn ha_supervisor_runs_sdown_through_failover_to_completion() {
    use keyspace_core::clock::Clock;
    use keyspace_core::ha::transport::{FakeTransport, PeerTransport};
    use keyspace_core::ha::{FailoverState, HealthState, Instance, Role, Supervisor, SupervisorConfig};

    let master_addr: std::net::SocketAddr = "127.0.0.1:6379".parse().unwrap();
    let clock = Arc::new(ManualClock::new(0));
    let transport = Arc::new(FakeTransport::new());
    transport.set_unreachable(master_addr);

    let supervisor = Supervisor::new(
        "observer-1",
        SupervisorConfig::new("mymaster", 2),
        clock.clone() as Arc<dyn Clock>,
        transport.clone() as Arc<dyn PeerTransport>,
    );

    assert_eq!(supervisor.tick(master_addr).await.unwrap(), HealthState::SDown);
    supervisor.record_peer_vote("observer-2", true).await;
    assert_eq!(supervisor.tick(master_addr).await.unwrap(), HealthState::ODown);

    let epoch = supervisor.start_election().await;
    supervisor.record_vote(epoch, "observer-2", "observer-1").await;
    assert!(supervisor.has_won_election(epoch, 3).await);

    supervisor.begin_failover(epoch).await;
    let candidate = Instance::new(Role::Replica, master_addr, "replica-1");
    supervisor.advance_failover_with_candidates(&[candidate]).await.unwrap();
    assert_eq!(supervisor.failover_state().await, Some(FailoverState::SendPromote));
}
