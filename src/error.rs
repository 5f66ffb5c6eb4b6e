//! Crate-wide error kinds.
//!
//! `spec.md` 7 defines one shared set of failure Kinds across every
//! component rather than per-module error types, so the data plane
//! (pack/quicklist/reclaim/eviction) and the HA supervisor both return
//! `CoreResult<T>` built on this single enum.

use thiserror::Error;

/// Reason a write was rejected while the engine is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyReason {
    /// A script is currently executing.
    ScriptRunning,
    /// The database is still loading from disk.
    Loading,
    /// Clients are paused.
    ClientsPaused,
}

impl std::fmt::Display for BusyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BusyReason::ScriptRunning => "script executing",
            BusyReason::Loading => "loading",
            BusyReason::ClientsPaused => "clients paused",
        };
        f.write_str(s)
    }
}

/// The shared error type for every core component.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A pack segment or quicklist growth would exceed the 2^32 - 1 byte cap.
    #[error("capacity exceeded")]
    CapacityExceeded,

    /// A decode produced an impossible length or encoding byte.
    #[error("malformed encoding")]
    MalformedEncoding,

    /// An index or bookmark lookup found nothing.
    #[error("not found")]
    NotFound,

    /// The engine cannot act right now (script running, loading, paused).
    #[error("busy: {0}")]
    Busy(BusyReason),

    /// A peer link is down; the caller should retry later.
    #[error("transient io: {0}")]
    TransientIo(String),

    /// An `is-master-down-by-addr` quorum could not be reached.
    #[error("quorum unreachable")]
    QuorumUnreachable,

    /// A leader election did not complete before `election-timeout`.
    #[error("election timeout")]
    ElectionTimeout,

    /// A replica did not report `role:master` before `failover-timeout`.
    #[error("promotion timeout")]
    PromotionTimeout,

    /// The supervisor's config file rewrite failed; in-memory state
    /// continues to evolve (logged at `warn`, never fatal).
    #[error("persist failed: {0}")]
    PersistFailed(String),
}

/// Result alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;
