//! # Frame Orchestrator
//!
//! Main-thread glue, one call per tick:
//!
//! ```text
//! Tick N:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. DRAIN + EXECUTE                                                  │
//! │    └─ CommandQueue::consume_all → CommandExecutor::execute_command  │
//! │                                                                     │
//! │ 2. FRAME BOUNDARY                                                   │
//! │    ├─ worker complete?  swap every buffer, then trigger next frame  │
//! │    └─ still running?    keep the stale fronts, count a frame skip   │
//! │                                                                     │
//! │ 3. ROUTE RESULTS                                                    │
//! │    └─ results naming a callback → CallbackQueue (drained by worker) │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The swap for frame N always happens after the worker finished frame N and
//! before frame N+1 is triggered, so the worker never sees a buffer mid-swap.

use std::sync::Arc;
use std::time::{Duration, Instant};

use twinframe_core::{BufferSet, TwinframeResult};
use twinframe_dispatch::{CallbackQueue, CommandExecutor, CommandQueue};

use crate::frame_state::Trigger;
use crate::worker::WorkerFrameJob;

/// Tick counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrchestratorStats {
    /// Ticks run.
    pub ticks: u64,
    /// Ticks that swapped buffers.
    pub swaps: u64,
    /// Ticks where the worker was still busy.
    pub frame_skips: u64,
    /// Commands executed across all ticks.
    pub commands_executed: u64,
    /// Results routed to callbacks across all ticks.
    pub callbacks_enqueued: u64,
}

/// What one tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Commands drained and executed.
    pub commands_executed: usize,
    /// Buffers swapped (0 on a frame skip).
    pub buffers_swapped: usize,
    /// Trigger outcome, if the frame boundary was crossed.
    pub trigger: Option<Trigger>,
    /// Results routed to callbacks.
    pub callbacks_enqueued: usize,
    /// Time spent in the tick.
    pub duration: Duration,
}

impl TickReport {
    /// Returns true if the worker was still busy this tick.
    #[must_use]
    pub fn skipped(&self) -> bool {
        self.trigger.is_none()
    }
}

/// Drives the per-tick sequence on the main thread.
pub struct FrameOrchestrator {
    commands: Arc<CommandQueue>,
    executor: CommandExecutor,
    callbacks: Arc<CallbackQueue>,
    buffers: BufferSet,
    worker: WorkerFrameJob,
    stats: OrchestratorStats,
}

impl FrameOrchestrator {
    /// Wires the components. Handlers must already be registered.
    #[must_use]
    pub fn new(
        commands: Arc<CommandQueue>,
        executor: CommandExecutor,
        callbacks: Arc<CallbackQueue>,
        buffers: BufferSet,
        worker: WorkerFrameJob,
    ) -> Self {
        Self {
            commands,
            executor,
            callbacks,
            buffers,
            worker,
            stats: OrchestratorStats::default(),
        }
    }

    /// Runs one tick.
    pub fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        self.stats.ticks += 1;

        let executor = &mut self.executor;
        let commands_executed = self.commands.consume_all(|command| {
            executor.execute_command(&command);
        });

        let (buffers_swapped, trigger) = if self.worker.is_frame_complete() {
            let swapped = self.buffers.swap_all();
            let trigger = self.worker.trigger_next_frame();
            self.stats.swaps += 1;
            (swapped, Some(trigger))
        } else {
            self.stats.frame_skips += 1;
            tracing::trace!(tick = self.stats.ticks, "worker busy, keeping stale fronts");
            (0, None)
        };

        let callbacks_enqueued = self.executor.execute_pending_callbacks(&self.callbacks);

        self.stats.commands_executed += commands_executed as u64;
        self.stats.callbacks_enqueued += callbacks_enqueued as u64;

        TickReport {
            tick: self.stats.ticks,
            commands_executed,
            buffers_swapped,
            trigger,
            callbacks_enqueued,
            duration: started.elapsed(),
        }
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> OrchestratorStats {
        self.stats
    }

    /// The executor, for stats and audit inspection.
    #[must_use]
    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Mutable executor access, e.g. to drain the audit log.
    pub fn executor_mut(&mut self) -> &mut CommandExecutor {
        &mut self.executor
    }

    /// The worker handle.
    pub fn worker(&mut self) -> &mut WorkerFrameJob {
        &mut self.worker
    }

    /// The command queue the script side submits into.
    #[must_use]
    pub fn commands(&self) -> &Arc<CommandQueue> {
        &self.commands
    }

    /// Stops the worker, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Propagates [`WorkerFrameJob::shutdown`] errors.
    pub fn shutdown(&mut self, timeout: Duration) -> TwinframeResult<()> {
        tracing::debug!(stats = ?self.stats, "orchestrator shutting down");
        self.worker.shutdown(timeout)
    }
}

impl std::fmt::Debug for FrameOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameOrchestrator")
            .field("buffers", &self.buffers)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::ScriptFault;
    use crate::runtime::{FrameContext, ScriptRuntime};
    use parking_lot::Mutex;
    use serde_json::json;
    use twinframe_core::StateBuffer;
    use twinframe_dispatch::{
        AgentId, CallbackHandle, Command, HandlerResult, Invocation, Outcome, PendingCallback,
    };

    const WAIT: Duration = Duration::from_secs(5);

    /// Writes its frame number into `frames` and asks for an echo each frame.
    struct Stamper {
        frames: Arc<StateBuffer<&'static str, u64>>,
        commands: Arc<CommandQueue>,
        delivered: Vec<(CallbackHandle, Option<String>)>,
    }

    impl ScriptRuntime for Stamper {
        fn update(&mut self, frame: &FrameContext) -> Result<(), ScriptFault> {
            self.frames.back().insert("frame", frame.frame);
            Ok(())
        }

        fn produce_commands(&mut self, frame: &FrameContext) -> Result<(), ScriptFault> {
            self.commands.submit(
                Command::new("echo", json!(frame.frame.to_string()), AgentId(1))
                    .with_callback(CallbackHandle(frame.frame)),
            );
            Ok(())
        }

        fn invoke_callback(&mut self, callback: &PendingCallback) -> Result<(), ScriptFault> {
            self.delivered
                .push((callback.handle, callback.result_id().map(str::to_string)));
            Ok(())
        }
    }

    #[test]
    fn test_swap_then_trigger_ordering() {
        let frames = Arc::new(StateBuffer::<&'static str, u64>::new("frames"));
        let commands = Arc::new(CommandQueue::new(16));
        let callbacks = Arc::new(CallbackQueue::new());
        let runtime = Arc::new(Mutex::new(Stamper {
            frames: Arc::clone(&frames),
            commands: Arc::clone(&commands),
            delivered: Vec::new(),
        }));

        let mut executor = CommandExecutor::new();
        executor.register_handler("echo", |inv: &Invocation<'_>| {
            HandlerResult::Success(Outcome::with_result_id(
                inv.payload.as_str().unwrap_or_default(),
            ))
        });

        let worker =
            WorkerFrameJob::spawn(Arc::clone(&runtime), Arc::clone(&callbacks), WAIT).unwrap();
        let buffers = BufferSet::new().with(frames.clone());
        let mut orchestrator =
            FrameOrchestrator::new(Arc::clone(&commands), executor, callbacks, buffers, worker);

        let first = orchestrator.tick();
        assert_eq!(first.trigger, Some(Trigger::Issued));
        assert_eq!(frames.front().get("frame"), None);

        for _ in 0..5 {
            assert!(orchestrator.worker().wait_for_frame(WAIT));
            let completed = orchestrator.worker().stats().frames_completed;
            let report = orchestrator.tick();
            assert!(!report.skipped());
            // Front shows exactly the frame that just completed.
            assert_eq!(frames.front().get("frame").copied(), Some(completed));
        }

        assert!(orchestrator.worker().wait_for_frame(WAIT));
        orchestrator.tick();
        assert!(orchestrator.worker().wait_for_frame(WAIT));
        orchestrator.shutdown(WAIT).unwrap();

        let stats = orchestrator.stats();
        assert_eq!(stats.ticks, 7);
        assert_eq!(stats.swaps, 7);
        assert_eq!(stats.frame_skips, 0);

        // Frame N's echo is executed on tick N+1 and delivered in frame N+2.
        let delivered = runtime.lock().delivered.clone();
        assert!(delivered.len() >= 4);
        for (i, (handle, id)) in delivered.iter().enumerate() {
            let n = i as u64 + 1;
            assert_eq!(*handle, CallbackHandle(n));
            assert_eq!(id.as_deref(), Some(n.to_string().as_str()));
        }
    }

    struct Slow {
        gate: crossbeam_channel::Receiver<()>,
    }

    impl ScriptRuntime for Slow {
        fn update(&mut self, _frame: &FrameContext) -> Result<(), ScriptFault> {
            let _ = self.gate.recv();
            Ok(())
        }

        fn invoke_callback(&mut self, _callback: &PendingCallback) -> Result<(), ScriptFault> {
            Ok(())
        }
    }

    #[test]
    fn test_busy_worker_counts_frame_skip() {
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let callbacks = Arc::new(CallbackQueue::new());
        let buffer = Arc::new(StateBuffer::<u32, u32>::new("b"));
        let worker = WorkerFrameJob::spawn(
            Arc::new(Mutex::new(Slow { gate: gate_rx })),
            Arc::clone(&callbacks),
            WAIT,
        )
        .unwrap();
        let mut orchestrator = FrameOrchestrator::new(
            Arc::new(CommandQueue::new(4)),
            CommandExecutor::new(),
            callbacks,
            BufferSet::new().with(buffer.clone()),
            worker,
        );

        assert!(!orchestrator.tick().skipped());
        let skipped = orchestrator.tick();
        assert!(skipped.skipped());
        assert_eq!(skipped.buffers_swapped, 0);
        assert_eq!(buffer.swap_count(), 1);
        assert_eq!(orchestrator.stats().frame_skips, 1);

        gate_tx.send(()).unwrap();
        assert!(orchestrator.worker().wait_for_frame(WAIT));
        assert!(!orchestrator.tick().skipped());
        assert_eq!(buffer.swap_count(), 2);

        drop(gate_tx);
        orchestrator.shutdown(WAIT).unwrap();
    }
}
