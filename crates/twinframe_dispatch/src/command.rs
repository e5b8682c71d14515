//! Commands submitted by the script side.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical submitter identity used for rate limiting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

/// Identifies a script callback waiting for a command result.
///
/// Allocated by the scripting runtime; opaque to the dispatch layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallbackHandle(pub u64);

/// A named request with an opaque payload.
///
/// Created at submission time, consumed exactly once by
/// [`CommandQueue::consume_all`](crate::CommandQueue::consume_all).
#[derive(Clone, Debug)]
pub struct Command {
    /// Handler name.
    pub name: String,
    /// Opaque payload, decoded by the handler.
    pub payload: Value,
    /// Who submitted it.
    pub agent: AgentId,
    /// When it was submitted.
    pub submitted_at: Instant,
    /// Callback waiting for the result, if any.
    pub callback: Option<CallbackHandle>,
}

impl Command {
    /// Creates a command stamped with the current time.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Value, agent: AgentId) -> Self {
        Self {
            name: name.into(),
            payload,
            agent,
            submitted_at: Instant::now(),
            callback: None,
        }
    }

    /// Routes the result to `callback`.
    #[must_use]
    pub fn with_callback(mut self, callback: CallbackHandle) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Overrides the submission timestamp.
    #[must_use]
    pub fn stamped_at(mut self, at: Instant) -> Self {
        self.submitted_at = at;
        self
    }
}
