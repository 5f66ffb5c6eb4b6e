//! Peer links (`spec.md` 4.5.4): the async connection pair (command +
//! pub/sub) an observer keeps open to each instance it monitors,
//! shared across every master that happens to route through the same
//! address.
//!
//! Grounded on the teacher's `enterprise/cluster/failover.rs`
//! `Connection`/health-check-loop shape, adapted from a single
//! cluster-wide connection table to one keyed by peer address.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

use crate::error::{CoreError, CoreResult};

/// The wire operations a link needs to support, abstracted so tests
/// can substitute an in-memory double instead of real sockets
/// (`spec.md` 1 keeps the actual client protocol out of scope).
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn ping(&self, addr: SocketAddr) -> CoreResult<()>;
    async fn publish_hello(&self, addr: SocketAddr, payload: Vec<u8>) -> CoreResult<()>;
}

/// One observer's connection to a peer address, reconnected at most
/// once per PING period rather than on every failed call, so a
/// genuinely down peer doesn't cause a reconnect storm.
#[derive(Debug)]
struct LinkState {
    connected: bool,
    last_reconnect_attempt_ms: i64,
}

/// Shared connection table: one [`LinkState`] per peer address, reused
/// across every master an observer monitors that happens to share a
/// peer (`spec.md` 4.5.4).
#[derive(Debug, Default, Clone)]
pub struct LinkTable {
    links: Arc<Mutex<HashMap<SocketAddr, LinkState>>>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `addr` reachable (a PING or HELLO succeeded).
    pub async fn mark_up(&self, addr: SocketAddr) {
        let mut links = self.links.lock().await;
        links
            .entry(addr)
            .or_insert(LinkState {
                connected: true,
                last_reconnect_attempt_ms: 0,
            })
            .connected = true;
    }

    /// Mark `addr` unreachable.
    pub async fn mark_down(&self, addr: SocketAddr) {
        let mut links = self.links.lock().await;
        if let Some(state) = links.get_mut(&addr) {
            state.connected = false;
        }
    }

    /// Whether a reconnect attempt to `addr` is due: once per PING
    /// period (`ping_period`) measured in milliseconds since the epoch.
    pub async fn should_attempt_reconnect(&self, addr: SocketAddr, now_ms: i64, ping_period: Duration) -> bool {
        let mut links = self.links.lock().await;
        let entry = links.entry(addr).or_insert(LinkState {
            connected: false,
            last_reconnect_attempt_ms: i64::MIN,
        });
        if entry.connected {
            return false;
        }
        let elapsed = now_ms - entry.last_reconnect_attempt_ms;
        if elapsed >= ping_period.as_millis() as i64 {
            entry.last_reconnect_attempt_ms = now_ms;
            true
        } else {
            false
        }
    }

    pub async fn is_connected(&self, addr: SocketAddr) -> bool {
        self.links
            .lock()
            .await
            .get(&addr)
            .map(|s| s.connected)
            .unwrap_or(false)
    }
}

/// A [`PeerTransport`] double for tests: every address not explicitly
/// marked unreachable succeeds.
#[derive(Debug, Default)]
pub struct FakeTransport {
    unreachable: std::sync::Mutex<std::collections::HashSet<SocketAddr>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, addr: SocketAddr) {
        self.unreachable.lock().unwrap().insert(addr);
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn ping(&self, addr: SocketAddr) -> CoreResult<()> {
        if self.unreachable.lock().unwrap().contains(&addr) {
            Err(CoreError::TransientIo(format!("unreachable: {addr}")))
        } else {
            Ok(())
        }
    }

    async fn publish_hello(&self, addr: SocketAddr, _payload: Vec<u8>) -> CoreResult<()> {
        self.ping(addr).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:6379".parse().unwrap()
    }

    #[tokio::test]
    async fn fresh_peer_is_due_for_an_immediate_reconnect() {
        let links = LinkTable::new();
        assert!(links.should_attempt_reconnect(addr(), 0, Duration::from_millis(1000)).await);
    }

    #[tokio::test]
    async fn reconnect_is_rate_limited_to_once_per_period() {
        let links = LinkTable::new();
        assert!(links.should_attempt_reconnect(addr(), 0, Duration::from_millis(1000)).await);
        assert!(!links.should_attempt_reconnect(addr(), 500, Duration::from_millis(1000)).await);
        assert!(links.should_attempt_reconnect(addr(), 1000, Duration::from_millis(1000)).await);
    }

    #[tokio::test]
    async fn connected_links_never_ask_to_reconnect() {
        let links = LinkTable::new();
        links.mark_up(addr()).await;
        assert!(!links.should_attempt_reconnect(addr(), 0, Duration::from_millis(1000)).await);
    }

    #[tokio::test]
    async fn fake_transport_reports_configured_failures() {
        let transport = FakeTransport::new();
        transport.set_unreachable(addr());
        assert!(transport.ping(addr()).await.is_err());
        assert!(transport.ping("127.0.0.1:7000".parse().unwrap()).await.is_ok());
    }
}
