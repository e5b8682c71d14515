//! # Command Executor
//!
//! Registry of named handlers, run synchronously on the main thread.
//!
//! ## Dispatch order
//!
//! ```text
//! execute_command(cmd)
//!   ├─ rate limit   (agent over budget  -> RateLimited)
//!   ├─ lookup       (no handler         -> UnknownCommand)
//!   ├─ invoke       (panic              -> HandlerFailure)
//!   ├─ audit        (observational only)
//!   └─ remember result for cmd.callback, if any
//! ```
//!
//! Every outcome is a [`HandlerResult`]; nothing a handler does escapes as a
//! panic or a thrown error.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::de::DeserializeOwned;
use twinframe_core::RuntimeConfig;

use crate::audit::{AuditLog, AuditOutcome, AuditRecord};
use crate::callback::{CallbackQueue, PendingCallback};
use crate::command::{CallbackHandle, Command};
use crate::handler::{panic_message, typed_handler, CommandHandler, Invocation};
use crate::rate_limit::RateLimiter;
use crate::result::{CommandError, ErrorKind, HandlerResult, Outcome};

/// Default audit retention when not configured.
const DEFAULT_AUDIT_RETENTION: usize = 1024;

/// Dispatch counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Commands passed to `execute_command`.
    pub executed: u64,
    /// Dispatches that returned success.
    pub succeeded: u64,
    /// Dispatches that returned an error (any kind).
    pub failed: u64,
    /// Of the failures, rejected by the rate limiter.
    pub rate_limited: u64,
    /// Of the failures, no handler registered.
    pub unknown: u64,
}

/// Named-handler dispatcher.
pub struct CommandExecutor {
    handlers: HashMap<String, Box<dyn CommandHandler>>,
    limiter: RateLimiter,
    audit: AuditLog,
    /// Results waiting to be routed to their callbacks.
    completed: Vec<(CallbackHandle, HandlerResult)>,
    stats: ExecutorStats,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor {
    /// Creates an executor with no handlers, no rate limit, and auditing off.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            limiter: RateLimiter::new(0),
            audit: AuditLog::new(DEFAULT_AUDIT_RETENTION),
            completed: Vec::new(),
            stats: ExecutorStats::default(),
        }
    }

    /// Creates an executor with rate limiting and auditing from `config`.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let mut executor = Self::new();
        executor.audit = AuditLog::new(config.audit_retention);
        executor.set_rate_limit_per_agent(config.rate_limit_per_agent);
        executor.set_audit_logging_enabled(config.audit_logging);
        executor
    }

    // =========================================================================
    // Setup (before steady-state dispatch)
    // =========================================================================

    /// Registers a closure handler under `name`, replacing any previous one.
    pub fn register_handler<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: FnMut(&Invocation<'_>) -> HandlerResult + Send + 'static,
    {
        self.register_boxed(name, Box::new(handler));
    }

    /// Registers a handler over a typed payload.
    ///
    /// Payloads that do not decode into `P` yield `InvalidPayload` without
    /// calling `handler`.
    pub fn register_typed<P, F>(&mut self, name: impl Into<String>, handler: F)
    where
        P: DeserializeOwned + 'static,
        F: FnMut(P, &Invocation<'_>) -> Result<Outcome, CommandError> + Send + 'static,
    {
        self.register_boxed(name, Box::new(typed_handler(handler)));
    }

    /// Registers an already boxed handler.
    pub fn register_boxed(&mut self, name: impl Into<String>, handler: Box<dyn CommandHandler>) {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::warn!(command = %name, "handler replaced");
        } else {
            tracing::debug!(command = %name, "handler registered");
        }
    }

    /// Returns true if a handler is registered under `name`.
    #[must_use]
    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Caps accepted commands per agent per rolling second. 0 disables.
    pub fn set_rate_limit_per_agent(&mut self, limit: u32) {
        self.limiter.set_limit(limit);
    }

    /// Turns the audit log on or off.
    pub fn set_audit_logging_enabled(&mut self, enabled: bool) {
        self.audit.set_enabled(enabled);
    }

    // =========================================================================
    // Dispatch (main thread)
    // =========================================================================

    /// Runs one command to completion on the calling thread.
    ///
    /// If the command names a callback, the result (success or error) is kept
    /// for the next [`execute_pending_callbacks`](Self::execute_pending_callbacks).
    pub fn execute_command(&mut self, command: &Command) -> HandlerResult {
        self.stats.executed += 1;
        let result = self.dispatch(command);

        match &result {
            HandlerResult::Success(_) => self.stats.succeeded += 1,
            HandlerResult::Error(err) => {
                self.stats.failed += 1;
                match err.kind {
                    ErrorKind::RateLimited => self.stats.rate_limited += 1,
                    ErrorKind::UnknownCommand => self.stats.unknown += 1,
                    _ => {}
                }
                tracing::debug!(command = %command.name, agent = command.agent.0, error = %err, "dispatch failed");
            }
        }

        self.audit
            .record(&command.name, command.agent, AuditOutcome::from(&result));

        if let Some(handle) = command.callback {
            self.completed.push((handle, result.clone()));
        }
        result
    }

    fn dispatch(&mut self, command: &Command) -> HandlerResult {
        if !self.limiter.check(command.agent, command.submitted_at) {
            tracing::warn!(
                command = %command.name,
                agent = command.agent.0,
                limit = self.limiter.limit(),
                "agent over rate limit"
            );
            return HandlerResult::error(
                ErrorKind::RateLimited,
                format!("{} exceeded {} commands/s", command.agent, self.limiter.limit()),
            );
        }

        let Some(handler) = self.handlers.get_mut(&command.name) else {
            return HandlerResult::error(
                ErrorKind::UnknownCommand,
                format!("no handler for '{}'", command.name),
            );
        };

        let invocation = Invocation::of(command);
        match catch_unwind(AssertUnwindSafe(|| handler.handle(&invocation))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(command = %command.name, panic = %message, "handler panicked");
                HandlerResult::error(ErrorKind::HandlerFailure, message)
            }
        }
    }

    /// Moves every completed result that names a callback into `queue` as a
    /// ready entry, in completion order. Returns the number enqueued.
    pub fn execute_pending_callbacks(&mut self, queue: &CallbackQueue) -> usize {
        let count = self.completed.len();
        for (handle, result) in self.completed.drain(..) {
            queue.enqueue(PendingCallback::ready(handle, result));
        }
        count
    }

    /// Results held for callbacks not yet enqueued.
    #[must_use]
    pub fn pending_callback_count(&self) -> usize {
        self.completed.len()
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Snapshot of retained audit records, oldest first.
    #[must_use]
    pub fn audit_log(&self) -> Vec<AuditRecord> {
        self.audit.records().cloned().collect()
    }

    /// Removes and returns retained audit records.
    pub fn drain_audit_log(&mut self) -> Vec<AuditRecord> {
        self.audit.drain()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        self.stats
    }

    /// Forgets rate-limit windows of idle agents.
    pub fn prune_rate_windows(&mut self) {
        self.limiter.prune(std::time::Instant::now());
    }
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("CommandExecutor")
            .field("handlers", &names)
            .field("rate_limit", &self.limiter.limit())
            .field("audit", &self.audit.is_enabled())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
