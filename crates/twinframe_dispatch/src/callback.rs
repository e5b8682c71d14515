//! # Callback Queue
//!
//! Results waiting for the script thread to re-enter.
//!
//! ```text
//! main thread (executor)              worker thread (inside its frame)
//!        │                                       │
//!        │── enqueue(ready) ──> [CallbackQueue] ──> drain ──> script fn
//! ```
//!
//! Lifecycle of an entry: `Pending → Ready → Delivered → removed`. An entry
//! is taken out of the queue before it is invoked, so it can never be
//! delivered twice, even when the invocation faults.

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::command::CallbackHandle;
use crate::result::HandlerResult;

/// Delivery state of a callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackState {
    /// Waiting for its command to complete.
    Pending,
    /// Result available, waiting for the script thread.
    Ready,
    /// Handed to the scripting runtime.
    Delivered,
}

/// A script callback and, once available, its result.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingCallback {
    /// Callback to invoke.
    pub handle: CallbackHandle,
    /// Result to deliver, present once ready.
    pub result: Option<HandlerResult>,
    state: CallbackState,
}

impl PendingCallback {
    /// A callback whose command has not completed yet.
    #[must_use]
    pub fn pending(handle: CallbackHandle) -> Self {
        Self {
            handle,
            result: None,
            state: CallbackState::Pending,
        }
    }

    /// A callback with its result available.
    #[must_use]
    pub fn ready(handle: CallbackHandle, result: HandlerResult) -> Self {
        Self {
            handle,
            result: Some(result),
            state: CallbackState::Ready,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CallbackState {
        self.state
    }

    /// Returns true once the result is available.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == CallbackState::Ready
    }

    /// Result identifier carried by a successful result.
    #[must_use]
    pub fn result_id(&self) -> Option<&str> {
        self.result.as_ref().and_then(HandlerResult::result_id)
    }
}

/// Outcome of one drain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Callbacks invoked without fault.
    pub delivered: u32,
    /// Callbacks whose invocation faulted.
    pub faulted: u32,
}

impl DrainReport {
    /// Total callbacks taken out of the queue.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.delivered + self.faulted
    }
}

/// Callback counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallbackStats {
    /// Entries ever enqueued.
    pub enqueued: u64,
    /// Entries invoked without fault.
    pub delivered: u64,
    /// Entries whose invocation faulted.
    pub faulted: u64,
}

/// One-writer/one-reader queue of script callbacks.
#[derive(Debug, Default)]
pub struct CallbackQueue {
    entries: Mutex<VecDeque<PendingCallback>>,
    enqueued: AtomicU64,
    delivered: AtomicU64,
    faulted: AtomicU64,
}

impl CallbackQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry at the back.
    pub fn enqueue(&self, callback: PendingCallback) {
        self.entries.lock().push_back(callback);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Attaches a result to a pending entry, making it ready.
    ///
    /// Returns false if no pending entry has this handle.
    pub fn complete(&self, handle: CallbackHandle, result: HandlerResult) -> bool {
        let mut entries = self.entries.lock();
        match entries
            .iter_mut()
            .find(|cb| cb.handle == handle && cb.state == CallbackState::Pending)
        {
            Some(cb) => {
                cb.result = Some(result);
                cb.state = CallbackState::Ready;
                true
            }
            None => false,
        }
    }

    /// Invokes every ready entry once, in insertion order, and removes it.
    ///
    /// Only call this where the scripting runtime can be re-entered. A
    /// fault in one invocation is logged and does not stop the rest.
    /// Pending entries stay queued.
    pub fn drain<F, E>(&self, mut invoke: F) -> DrainReport
    where
        F: FnMut(&PendingCallback) -> Result<(), E>,
        E: Display,
    {
        let ready: Vec<PendingCallback> = {
            let mut entries = self.entries.lock();
            let (ready, pending): (VecDeque<_>, VecDeque<_>) =
                entries.drain(..).partition(PendingCallback::is_ready);
            *entries = pending;
            ready.into()
        };

        let mut report = DrainReport::default();
        for mut callback in ready {
            callback.state = CallbackState::Delivered;
            match invoke(&callback) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.faulted += 1;
                    tracing::error!(
                        callback = callback.handle.0,
                        error = %err,
                        "script callback faulted"
                    );
                }
            }
        }

        self.delivered
            .fetch_add(u64::from(report.delivered), Ordering::Relaxed);
        self.faulted
            .fetch_add(u64::from(report.faulted), Ordering::Relaxed);
        report
    }

    /// Entries queued, pending or ready.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Entries ready for delivery.
    #[must_use]
    pub fn ready_len(&self) -> usize {
        self.entries.lock().iter().filter(|cb| cb.is_ready()).count()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> CallbackStats {
        CallbackStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            faulted: self.faulted.load(Ordering::Relaxed),
        }
    }
}
