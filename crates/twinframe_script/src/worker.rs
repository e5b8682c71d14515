//! # Worker Frame Job
//!
//! Owns the scripting thread. One frame per signal, never re-entrant.
//!
//! ## Architecture
//!
//! ```text
//!   main thread                                  script thread
//!   ───────────                                  ─────────────
//!   trigger_next_frame ── WorkerSignal::Frame ──> recv
//!                                                 lock runtime (global execution lock)
//!                       <── WorkerEvent::Started  drain callbacks
//!                                                 update pass
//!                                                 produce pass
//!   is_frame_complete   <── WorkerEvent::Finished unlock
//! ```
//!
//! The worker blocks in `recv` between frames. Faults and panics inside a
//! pass are caught, logged, and returned in the [`FrameReport`]; the frame is
//! still marked complete so one bad script frame cannot stall the pipeline.
//!
//! ## Shutdown
//!
//! [`WorkerFrameJob::shutdown`] waits a bounded time for the loop to exit.
//! A worker that does not answer in time is detached and
//! [`TwinframeError::WorkerShutdownTimeout`] is returned.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use twinframe_core::{TwinframeError, TwinframeResult};
use twinframe_dispatch::{panic_message, CallbackQueue};

use crate::fault::{FaultPhase, ScriptFault};
use crate::frame_state::{FramePhase, FrameState, Lifecycle, Trigger};
use crate::runtime::{FrameContext, ScriptRuntime};

/// Owner to worker.
#[derive(Debug)]
enum WorkerSignal {
    Frame,
    Shutdown,
}

/// Worker to owner.
#[derive(Debug)]
enum WorkerEvent {
    Started(u64),
    Finished(FrameReport),
    Stopped,
}

/// Summary of one worker frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// Wall time spent inside the frame, lock held.
    pub duration: Duration,
    /// Faults caught during the frame, in the order raised.
    pub faults: Vec<ScriptFault>,
    /// Callbacks delivered without fault.
    pub callbacks_delivered: u32,
}

impl FrameReport {
    /// Returns true if nothing faulted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Worker counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Frames the worker finished.
    pub frames_completed: u64,
    /// Faults caught across all frames.
    pub faults: u64,
    /// Triggers issued while a frame was still outstanding.
    pub skip_warnings: u64,
}

/// Counters written by the worker thread.
#[derive(Debug, Default)]
struct Shared {
    shutdown: AtomicBool,
    frames_completed: AtomicU64,
    faults: AtomicU64,
}

/// Handle to the scripting worker thread.
pub struct WorkerFrameJob {
    signals: Sender<WorkerSignal>,
    events: Receiver<WorkerEvent>,
    state: FrameState,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
    skip_warnings: u64,
    last_report: Option<FrameReport>,
}

impl WorkerFrameJob {
    /// Starts the worker thread.
    ///
    /// `runtime` is the global execution lock: the worker holds it for the
    /// whole of each frame. `shutdown_timeout` bounds the wait in `Drop`.
    ///
    /// # Errors
    ///
    /// Returns [`TwinframeError::WorkerSpawn`] if the thread cannot start.
    pub fn spawn<R: ScriptRuntime>(
        runtime: Arc<Mutex<R>>,
        callbacks: Arc<CallbackQueue>,
        shutdown_timeout: Duration,
    ) -> TwinframeResult<Self> {
        let (signal_tx, signal_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let shared = Arc::new(Shared::default());

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("twinframe-script".to_string())
            .spawn(move || {
                worker_loop(&runtime, &callbacks, &signal_rx, &event_tx, &worker_shared);
            })
            .map_err(|e| TwinframeError::WorkerSpawn(e.to_string()))?;

        tracing::debug!("script worker started");
        Ok(Self {
            signals: signal_tx,
            events: event_rx,
            state: FrameState::new(),
            shared,
            handle: Some(handle),
            shutdown_timeout,
            skip_warnings: 0,
            last_report: None,
        })
    }

    // =========================================================================
    // Frame handshake (main thread)
    // =========================================================================

    /// Requests the next frame.
    ///
    /// Meant to be called only when [`is_frame_complete`](Self::is_frame_complete)
    /// holds. Otherwise a skip warning is recorded and the request is latched
    /// behind the frame in progress (or merged with one already waiting).
    pub fn trigger_next_frame(&mut self) -> Trigger {
        self.poll();
        let trigger = self.state.trigger();
        if trigger.is_skip() {
            self.skip_warnings += 1;
            tracing::warn!(
                phase = %self.state.phase(),
                ?trigger,
                "frame triggered before previous frame completed"
            );
        }
        if trigger.sends_signal() && self.signals.send(WorkerSignal::Frame).is_err() {
            tracing::warn!("script worker is gone, frame request dropped");
        }
        trigger
    }

    /// Non-blocking: true when no frame is requested or running.
    pub fn is_frame_complete(&mut self) -> bool {
        self.poll();
        self.state.is_frame_complete()
    }

    /// Current frame phase.
    pub fn phase(&mut self) -> FramePhase {
        self.poll();
        self.state.phase()
    }

    /// Current teardown phase.
    pub fn lifecycle(&mut self) -> Lifecycle {
        self.poll();
        self.state.lifecycle()
    }

    /// Blocks up to `timeout` for outstanding frames to finish.
    ///
    /// Returns true if the worker is frame-complete on return.
    pub fn wait_for_frame(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.poll();
        while !self.state.is_frame_complete() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => self.apply(event),
                Err(_) => return false,
            }
        }
        true
    }

    /// Report of the most recently finished frame.
    #[must_use]
    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            frames_completed: self.shared.frames_completed.load(Ordering::Acquire),
            faults: self.shared.faults.load(Ordering::Relaxed),
            skip_warnings: self.skip_warnings,
        }
    }

    fn poll(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Started(frame) => {
                tracing::trace!(frame, "frame started");
                self.state.on_started();
            }
            WorkerEvent::Finished(report) => {
                tracing::trace!(
                    frame = report.frame,
                    duration_us = u64::try_from(report.duration.as_micros()).unwrap_or(u64::MAX),
                    faults = report.faults.len(),
                    "frame finished"
                );
                self.state.on_finished();
                self.last_report = Some(report);
            }
            WorkerEvent::Stopped => self.state.on_stopped(),
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Asks the worker to stop after the frame in progress. Non-blocking.
    pub fn request_shutdown(&mut self) {
        self.poll();
        if self.state.lifecycle() != Lifecycle::Active {
            return;
        }
        self.shared.shutdown.store(true, Ordering::Release);
        self.state.on_shutdown_requested();
        // A send error means the worker already exited.
        let _ = self.signals.send(WorkerSignal::Shutdown);
    }

    /// Non-blocking: true once the worker loop has exited.
    pub fn is_shutdown_complete(&mut self) -> bool {
        self.lifecycle() == Lifecycle::ShutdownComplete
    }

    /// Stops the worker, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TwinframeError::WorkerShutdownTimeout`] if the worker did not
    /// stop in time. The thread is then detached and never joined.
    pub fn shutdown(&mut self, timeout: Duration) -> TwinframeResult<()> {
        self.request_shutdown();
        let deadline = Instant::now() + timeout;

        while self.state.lifecycle() != Lifecycle::ShutdownComplete {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => self.apply(event),
                Err(RecvTimeoutError::Disconnected) => self.state.on_stopped(),
                Err(RecvTimeoutError::Timeout) => {
                    let waited_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                    if self.handle.take().is_some() {
                        tracing::warn!(waited_ms, "script worker hung, abandoning thread");
                    }
                    return Err(TwinframeError::WorkerShutdownTimeout { waited_ms });
                }
            }
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("script worker thread panicked");
            }
            tracing::debug!(
                frames = self.shared.frames_completed.load(Ordering::Acquire),
                "script worker joined"
            );
        }
        Ok(())
    }
}

impl Drop for WorkerFrameJob {
    fn drop(&mut self) {
        if self.handle.is_some() {
            // Timeout already logged.
            let _ = self.shutdown(self.shutdown_timeout);
        }
    }
}

impl std::fmt::Debug for WorkerFrameJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerFrameJob")
            .field("phase", &self.state.phase())
            .field("lifecycle", &self.state.lifecycle())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Worker thread
// =============================================================================

fn worker_loop<R: ScriptRuntime>(
    runtime: &Mutex<R>,
    callbacks: &CallbackQueue,
    signals: &Receiver<WorkerSignal>,
    events: &Sender<WorkerEvent>,
    shared: &Shared,
) {
    let mut frame = 0u64;
    let mut previous_start: Option<Instant> = None;

    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        match signals.recv() {
            Ok(WorkerSignal::Frame) => {
                if shared.shutdown.load(Ordering::Acquire) {
                    break;
                }
                frame += 1;
                let started = Instant::now();
                let delta = previous_start.map_or(Duration::ZERO, |prev| started - prev);
                previous_start = Some(started);

                let _ = events.send(WorkerEvent::Started(frame));
                let report = run_frame(runtime, callbacks, FrameContext { frame, delta });
                shared
                    .faults
                    .fetch_add(report.faults.len() as u64, Ordering::Relaxed);
                shared.frames_completed.fetch_add(1, Ordering::Release);
                let _ = events.send(WorkerEvent::Finished(report));
            }
            Ok(WorkerSignal::Shutdown) | Err(_) => break,
        }
    }

    tracing::debug!(frames = frame, "script worker loop exited");
    let _ = events.send(WorkerEvent::Stopped);
}

fn run_frame<R: ScriptRuntime>(
    runtime: &Mutex<R>,
    callbacks: &CallbackQueue,
    ctx: FrameContext,
) -> FrameReport {
    let started = Instant::now();
    let mut faults = Vec::new();
    let mut runtime = runtime.lock();

    let drained = callbacks.drain(|callback| {
        guarded(FaultPhase::Callback, || runtime.invoke_callback(callback)).map_err(|fault| {
            faults.push(fault.clone());
            fault
        })
    });

    if let Err(fault) = guarded(FaultPhase::Update, || runtime.update(&ctx)) {
        fault.log(ctx.frame);
        faults.push(fault);
    }
    if let Err(fault) = guarded(FaultPhase::Produce, || runtime.produce_commands(&ctx)) {
        fault.log(ctx.frame);
        faults.push(fault);
    }
    drop(runtime);

    FrameReport {
        frame: ctx.frame,
        duration: started.elapsed(),
        faults,
        callbacks_delivered: drained.delivered,
    }
}

/// Runs one pass, turning a panic into a fault.
fn guarded(
    phase: FaultPhase,
    pass: impl FnOnce() -> Result<(), ScriptFault>,
) -> Result<(), ScriptFault> {
    match catch_unwind(AssertUnwindSafe(pass)) {
        Ok(result) => result,
        Err(payload) => Err(ScriptFault::panic(phase, panic_message(payload.as_ref()))),
    }
}
