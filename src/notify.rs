//! The publish surface: the one dependency the core has on the
//! (out-of-scope) client/pub-sub fan-out layer.
//!
//! `spec.md` 1 excludes "client connection management and pub/sub
//! fan-out (only the publish surface is a dependency)". `NotificationSink`
//! is that surface: eviction and lazy-reclaim call into it after a
//! mutation, per `spec.md` 5's ordering rule ("Publish notifications
//! ... are emitted after the database mutation and before the
//! triggering command returns"). Channel naming follows `spec.md` 6.
#![allow(missing_docs)]

use parking_lot::Mutex;

/// A notification event class, matching the filter flags of `spec.md` 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    Generic,
    Expired,
    Evicted,
    KeyMiss,
}

impl EventClass {
    /// The single-character filter flag used in `notify-keyspace-events`.
    pub fn flag(self) -> char {
        match self {
            EventClass::Generic => 'g',
            EventClass::Expired => 'g',
            EventClass::Evicted => 'e',
            EventClass::KeyMiss => 'm',
        }
    }
}

/// The boundary the data plane depends on to reach the (out of scope)
/// pub/sub layer. Implementations publish on the two channel families
/// of `spec.md` 6: `__keyspace@<db>__:<key>` with payload `<event>`,
/// and `__keyevent@<db>__:<event>` with payload `<key>`.
pub trait NotificationSink: Send + Sync {
    /// Publish a keyspace/keyevent notification pair for `event` on `key`
    /// in database `db`.
    fn notify(&self, class: EventClass, db: usize, event: &str, key: &[u8]);
}

/// A sink that drops every notification. Used where no pub/sub layer is
/// wired in (e.g. standalone data-plane tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _class: EventClass, _db: usize, _event: &str, _key: &[u8]) {}
}

/// A sink that records every notification it receives, for assertions in
/// tests that must observe eviction/expiry ordering.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(EventClass, usize, String, Vec<u8>)>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every notification recorded so far, in emission order.
    pub fn drain(&self) -> Vec<(EventClass, usize, String, Vec<u8>)> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, class: EventClass, db: usize, event: &str, key: &[u8]) {
        self.events
            .lock()
            .push((class, db, event.to_string(), key.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_preserves_order() {
        let sink = RecordingSink::new();
        sink.notify(EventClass::Evicted, 0, "evicted", b"a");
        sink.notify(EventClass::Expired, 0, "expired", b"b");

        let events = sink.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].2, "evicted");
        assert_eq!(events[1].2, "expired");
        assert!(sink.drain().is_empty());
    }
}
