//! HELLO gossip processing (`spec.md` 4.5.2): the eight-field payload
//! observers exchange over the pub/sub channel to discover each other
//! and agree on the current master, without a static peer list.

use super::instance::{AddressBook, HealthState, Instance, Role};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// One HELLO message, as published on the shared gossip channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloMessage {
    pub observer_addr: SocketAddr,
    pub observer_run_id: String,
    pub observer_config_epoch: u64,
    pub master_name: String,
    pub master_addr: SocketAddr,
    pub master_config_epoch: u64,
    pub master_run_id: String,
    pub quorum: usize,
}

/// The outcome of folding one HELLO message into an [`AddressBook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloOutcome {
    /// Nothing changed; the sender and epoch were already known.
    NoChange,
    /// A new peer observer was learned.
    NewObserver,
    /// The sender's reported config epoch is newer than the epoch on
    /// record; the caller should adopt it (`spec.md` 4.5.5).
    NewerConfigEpoch { epoch: u64 },
}

impl HelloMessage {
    /// Serialize for publication on the gossip channel.
    pub fn to_json(&self) -> CoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            log::warn!("hello message failed to serialize: {e}");
            CoreError::MalformedEncoding
        })
    }

    /// Parse a payload received from the gossip channel.
    pub fn from_json(bytes: &[u8]) -> CoreResult<Self> {
        serde_json::from_slice(bytes).map_err(|_| CoreError::MalformedEncoding)
    }
}

/// Process a HELLO for `master_name`, updating `book` in place.
/// Messages about other masters are ignored (`NoChange`).
pub fn process_hello(book: &mut AddressBook, known_epoch: u64, hello: &HelloMessage) -> HelloOutcome {
    let was_known = book
        .observers
        .iter()
        .any(|o| o.run_id == hello.observer_run_id);

    book.upsert_observer(Instance {
        role: Role::Observer,
        addr: hello.observer_addr,
        run_id: hello.observer_run_id.clone(),
        health: HealthState::Healthy,
        config_epoch: hello.observer_config_epoch,
        last_ping_reply_ms_ago: 0,
    });

    if hello.master_config_epoch > known_epoch {
        return HelloOutcome::NewerConfigEpoch {
            epoch: hello.master_config_epoch,
        };
    }

    if !was_known {
        HelloOutcome::NewObserver
    } else {
        HelloOutcome::NoChange
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello(run_id: &str, epoch: u64) -> HelloMessage {
        HelloMessage {
            observer_addr: "127.0.0.1:26379".parse().unwrap(),
            observer_run_id: run_id.to_string(),
            observer_config_epoch: 0,
            master_name: "mymaster".to_string(),
            master_addr: "127.0.0.1:6379".parse().unwrap(),
            master_config_epoch: epoch,
            master_run_id: "m1".to_string(),
            quorum: 2,
        }
    }

    #[test]
    fn first_hello_from_a_peer_is_reported_as_new() {
        let mut book = AddressBook::new();
        let outcome = process_hello(&mut book, 0, &hello("obs-1", 0));
        assert_eq!(outcome, HelloOutcome::NewObserver);
        assert_eq!(book.observers.len(), 1);
    }

    #[test]
    fn repeat_hello_at_same_epoch_is_a_no_op() {
        let mut book = AddressBook::new();
        process_hello(&mut book, 0, &hello("obs-1", 0));
        let outcome = process_hello(&mut book, 0, &hello("obs-1", 0));
        assert_eq!(outcome, HelloOutcome::NoChange);
        assert_eq!(book.observers.len(), 1);
    }

    #[test]
    fn newer_config_epoch_is_surfaced_for_adoption() {
        let mut book = AddressBook::new();
        let outcome = process_hello(&mut book, 3, &hello("obs-1", 7));
        assert_eq!(outcome, HelloOutcome::NewerConfigEpoch { epoch: 7 });
    }

    #[test]
    fn gossip_payload_round_trips_through_json() {
        let original = hello("obs-1", 4);
        let bytes = original.to_json().unwrap();
        let restored = HelloMessage::from_json(&bytes).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn malformed_gossip_payload_is_rejected() {
        assert_eq!(HelloMessage::from_json(b"not json"), Err(CoreError::MalformedEncoding));
    }
}
