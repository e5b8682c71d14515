//! # TWINFRAME Script
//!
//! The scripting worker thread and the main-thread tick that drives it.
//!
//! ## Architecture Rules
//!
//! 1. **One worker, one frame at a time** - the runtime sits behind a single
//!    execution lock held by the worker for the whole frame
//! 2. **Swap before trigger** - buffers are swapped only after frame N
//!    completes and before frame N+1 is requested
//! 3. **Faults are contained** - a failing script frame is logged, reported,
//!    and still marked complete
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use twinframe_core::{BufferSet, RuntimeConfig};
//! use twinframe_dispatch::{AgentId, CallbackQueue, CommandExecutor, CommandQueue};
//! use twinframe_script::{FrameOrchestrator, RhaiRuntime, ScriptBuffer, ScriptWorld, WorkerFrameJob};
//!
//! let config = RuntimeConfig::default();
//! let entities = Arc::new(ScriptBuffer::new("entities"));
//! let commands = Arc::new(CommandQueue::new(config.queue_capacity));
//! let callbacks = Arc::new(CallbackQueue::new());
//!
//! let world = ScriptWorld::new(Arc::clone(&commands), AgentId(1), [Arc::clone(&entities)]);
//! let runtime = Arc::new(Mutex::new(RhaiRuntime::from_file("main.rhai", world, &config)?));
//! let worker = WorkerFrameJob::spawn(runtime, Arc::clone(&callbacks), config.shutdown_timeout())?;
//!
//! let mut orchestrator = FrameOrchestrator::new(
//!     commands,
//!     CommandExecutor::from_config(&config),
//!     callbacks,
//!     BufferSet::new().with(entities.clone()),
//!     worker,
//! );
//! loop {
//!     orchestrator.tick();
//!     // render from entities.front()
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod fault;
pub mod frame_state;
pub mod orchestrator;
pub mod rhai_runtime;
pub mod runtime;
pub mod worker;

pub use fault::{FaultKind, FaultPhase, ScriptFault, SourceLocation};
pub use frame_state::{FramePhase, FrameState, Lifecycle, Trigger};
pub use orchestrator::{FrameOrchestrator, OrchestratorStats, TickReport};
pub use rhai_runtime::{RhaiRuntime, ScriptBuffer, ScriptWorld};
pub use runtime::{FrameContext, ScriptRuntime};
pub use worker::{FrameReport, WorkerFrameJob, WorkerStats};
