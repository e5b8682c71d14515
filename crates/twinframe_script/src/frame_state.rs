//! # Frame Handshake State Machine
//!
//! Main-thread view of the worker. The worker reports progress over a
//! channel; the owner applies those reports here and consults the table
//! before signalling.
//!
//! ```text
//!              trigger                started               finished
//!   Idle ──────────────> FrameRequested ──────> Running ──────────────> FrameComplete
//!                              ▲   │ trigger:               │ trigger:      │
//!                              │   └ coalesced              └ latched       │ trigger
//!                              └────────────────────────────────────────────┘
//! ```
//!
//! A trigger while `Running` is latched: it is sent immediately, and the
//! worker picks it up only after the running frame finishes. A trigger while
//! `FrameRequested` is merged into the request already in flight.
//!
//! Teardown is orthogonal: `Active → ShutdownRequested → ShutdownComplete`.

use std::fmt;

/// Steady-state frame phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    /// No frame has been requested yet.
    Idle,
    /// A frame is requested and not yet started.
    FrameRequested,
    /// The worker is inside a frame.
    Running,
    /// The last frame finished and nothing is outstanding.
    FrameComplete,
}

/// Teardown phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Accepting frame triggers.
    Active,
    /// Shutdown signalled, worker not yet stopped.
    ShutdownRequested,
    /// Worker loop has exited.
    ShutdownComplete,
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a trigger did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// A new frame was requested from an idle or complete worker.
    Issued,
    /// The worker was mid-frame; the request is latched behind it.
    Latched,
    /// A request was already waiting; nothing new was sent.
    Coalesced,
    /// The worker is shutting down; ignored.
    Rejected,
}

impl Trigger {
    /// Returns true if a frame signal must be sent to the worker.
    #[must_use]
    pub fn sends_signal(self) -> bool {
        matches!(self, Self::Issued | Self::Latched)
    }

    /// Returns true if the trigger violated the "only when complete" rule.
    #[must_use]
    pub fn is_skip(self) -> bool {
        matches!(self, Self::Latched | Self::Coalesced)
    }
}

/// Owner-side handshake state.
#[derive(Clone, Debug)]
pub struct FrameState {
    /// A frame signal is in flight and the worker has not started it.
    requested: bool,
    /// The worker reported a start without a matching finish.
    running: bool,
    /// Frames the worker has finished.
    completed: u64,
    lifecycle: Lifecycle,
}

impl Default for FrameState {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameState {
    /// Idle and active.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            requested: false,
            running: false,
            completed: 0,
            lifecycle: Lifecycle::Active,
        }
    }

    /// Current frame phase.
    #[must_use]
    pub fn phase(&self) -> FramePhase {
        if self.running {
            FramePhase::Running
        } else if self.requested {
            FramePhase::FrameRequested
        } else if self.completed > 0 {
            FramePhase::FrameComplete
        } else {
            FramePhase::Idle
        }
    }

    /// Current teardown phase.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// True when nothing is requested or running.
    #[must_use]
    pub fn is_frame_complete(&self) -> bool {
        !self.requested && !self.running
    }

    /// Frames the worker has reported finished.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Applies a trigger. The caller sends a signal iff
    /// [`Trigger::sends_signal`] holds for the result.
    pub fn trigger(&mut self) -> Trigger {
        if self.lifecycle != Lifecycle::Active {
            return Trigger::Rejected;
        }
        if self.requested {
            return Trigger::Coalesced;
        }
        self.requested = true;
        if self.running {
            Trigger::Latched
        } else {
            Trigger::Issued
        }
    }

    /// The worker started the requested frame.
    pub fn on_started(&mut self) {
        debug_assert!(!self.running, "worker re-entered a frame");
        self.requested = false;
        self.running = true;
    }

    /// The worker finished its frame.
    pub fn on_finished(&mut self) {
        self.running = false;
        self.completed += 1;
    }

    /// Shutdown was signalled.
    pub fn on_shutdown_requested(&mut self) {
        if self.lifecycle == Lifecycle::Active {
            self.lifecycle = Lifecycle::ShutdownRequested;
        }
    }

    /// The worker loop exited.
    pub fn on_stopped(&mut self) {
        self.requested = false;
        self.running = false;
        self.lifecycle = Lifecycle::ShutdownComplete;
    }
}
