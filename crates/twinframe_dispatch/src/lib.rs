//! # TWINFRAME Dispatch
//!
//! Moves work from the script thread to the main thread and results back.
//!
//! ## Flow
//!
//! ```text
//! script thread                 main thread                      script thread
//!      │                             │                                 │
//!      │── submit(Command) ──> [CommandQueue] ── consume_all ──>       │
//!      │                             │                                 │
//!      │                     CommandExecutor::execute_command          │
//!      │                       ├─ rate limit (per agent)               │
//!      │                       ├─ handler lookup + invoke              │
//!      │                       └─ audit                                │
//!      │                             │                                 │
//!      │                 execute_pending_callbacks ──> [CallbackQueue] │
//!      │                                                    └─ drain ─>│
//! ```
//!
//! Per-command failures are values ([`HandlerResult::Error`]), never panics
//! that cross the dispatch boundary.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod audit;
pub mod callback;
pub mod command;
pub mod executor;
pub mod handler;
pub mod queue;
pub mod rate_limit;
pub mod result;

pub use audit::{AuditLog, AuditOutcome, AuditRecord};
pub use callback::{CallbackQueue, CallbackState, CallbackStats, DrainReport, PendingCallback};
pub use command::{AgentId, CallbackHandle, Command};
pub use executor::{CommandExecutor, ExecutorStats};
pub use handler::{panic_message, typed_handler, CommandHandler, Invocation};
pub use queue::{CommandQueue, QueueStats};
pub use rate_limit::{RateLimiter, RATE_WINDOW};
pub use result::{CommandError, ErrorKind, HandlerResult, Outcome};
