//! The lazy reclaimer (`spec.md` 4.3): decide whether freeing a value
//! is cheap enough to do inline, or expensive enough to hand off to a
//! background worker.
//!
//! This is the one part of the data plane that talks to real OS
//! threads rather than staying purely synchronous (`spec.md` 5): a
//! small pool of native threads drains a `crossbeam` FIFO, mirroring
//! how the rest of the crate keeps the async runtime out of the
//! per-command hot path and reserves `tokio` for the HA supervisor.

use crossbeam::channel::{self, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Work handed to a background worker: anything that, when dropped,
/// performs the actual free. Boxed so callers can hand off whatever
/// owns the expensive structure (a `Quicklist`, a hash table, ...).
pub type ReclaimWork = Box<dyn FnOnce() + Send + 'static>;

/// Below this element-count estimate, freeing happens inline on the
/// caller's thread; at or above it, the work is hashed off to a
/// background worker (`spec.md` 4.3's "threshold-64-and-refcount-1"
/// rule).
pub const ASYNC_THRESHOLD: usize = 64;

/// Estimate the amount of work freeing a value of `element_count`
/// elements represents, for the threshold decision. A scalar value
/// (strings, integers) is always `1`; aggregates pass their element
/// count; streams pass a best-effort estimate since their true cost
/// is not a simple count.
pub fn work_estimate(element_count: usize) -> usize {
    element_count.max(1)
}

/// Whether a free of `refcount` sharers and `element_count` elements
/// should be deferred to the background pool.
pub fn should_defer(refcount: usize, element_count: usize) -> bool {
    refcount <= 1 && work_estimate(element_count) >= ASYNC_THRESHOLD
}

/// A pool of native threads draining a shared FIFO of reclaim work.
pub struct Reclaimer {
    sender: Option<Sender<ReclaimWork>>,
    pending: Arc<AtomicUsize>,
    workers: Vec<JoinHandle<()>>,
}

impl Reclaimer {
    /// Spawn `worker_count` background threads.
    pub fn new(worker_count: usize) -> Self {
        let (sender, receiver): (Sender<ReclaimWork>, Receiver<ReclaimWork>) = channel::unbounded();
        let pending = Arc::new(AtomicUsize::new(0));
        let workers = (0..worker_count.max(1))
            .map(|_| {
                let receiver = receiver.clone();
                let pending = Arc::clone(&pending);
                std::thread::spawn(move || {
                    while let Ok(work) = receiver.recv() {
                        work();
                        pending.fetch_sub(1, Ordering::AcqRel);
                    }
                })
            })
            .collect();
        Reclaimer { sender: Some(sender), pending, workers }
    }

    /// Free `value` now if it's cheap, or hand it to a background
    /// worker if it's expensive. `value` is consumed either way; its
    /// `Drop` impl does the actual work.
    pub fn reclaim<T: Send + 'static>(&self, refcount: usize, element_count: usize, value: T) {
        if should_defer(refcount, element_count) {
            self.pending.fetch_add(1, Ordering::AcqRel);
            let boxed: ReclaimWork = Box::new(move || drop(value));
            // `sender` is only `None` after `Drop::drop` has started, by
            // which point no caller should still hold a `&Reclaimer`.
            let sent = self.sender.as_ref().expect("reclaim called after shutdown").send(boxed);
            if sent.is_err() {
                self.pending.fetch_sub(1, Ordering::AcqRel);
            }
        } else {
            drop(value);
        }
    }

    /// Number of reclaim jobs queued or in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        // drop our `Sender` first so every worker's `recv` returns `Err`
        // and its loop exits; joining before this would deadlock forever.
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
