//! # Handler Results
//!
//! Every dispatch produces a [`HandlerResult`]. Failures are data: they carry
//! a machine-readable [`ErrorKind`] and travel back to the originating
//! callback like any success.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Machine-readable failure category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Payload could not be decoded into the handler's payload type.
    InvalidPayload,
    /// Payload decoded but a value is out of range or otherwise rejected.
    InvalidParam,
    /// The referenced record does not exist.
    NotFound,
    /// The command queue was full.
    QueueFull,
    /// The agent exceeded its per-second budget.
    RateLimited,
    /// The handler exists but the operation is not implemented.
    NotImplemented,
    /// A subsystem the handler needs has not been set up.
    NotInitialized,
    /// No handler is registered under the command name.
    UnknownCommand,
    /// The handler panicked.
    HandlerFailure,
}

impl ErrorKind {
    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidPayload => "invalid_payload",
            Self::InvalidParam => "invalid_param",
            Self::NotFound => "not_found",
            Self::QueueFull => "queue_full",
            Self::RateLimited => "rate_limited",
            Self::NotImplemented => "not_implemented",
            Self::NotInitialized => "not_initialized",
            Self::UnknownCommand => "unknown_command",
            Self::HandlerFailure => "handler_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed dispatch.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct CommandError {
    /// Failure category.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl CommandError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Payload could not be decoded.
    #[must_use]
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidPayload, message)
    }

    /// A payload value was rejected.
    #[must_use]
    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParam, message)
    }

    /// The referenced record does not exist.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// The operation is not implemented.
    #[must_use]
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, message)
    }

    /// A required subsystem is missing.
    #[must_use]
    pub fn not_initialized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotInitialized, message)
    }
}

/// Named result fields of a successful dispatch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Generated identifier destined for the waiting callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
    /// Any other named fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
}

impl Outcome {
    /// Success with no fields.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Success carrying a result identifier.
    #[must_use]
    pub fn with_result_id(id: impl Into<String>) -> Self {
        Self {
            result_id: Some(id.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Adds a named field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Looks up a named field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Result of one dispatch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HandlerResult {
    /// The handler succeeded.
    Success(Outcome),
    /// The dispatch failed.
    Error(CommandError),
}

impl HandlerResult {
    /// Shorthand for an error result.
    #[must_use]
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error(CommandError::new(kind, message))
    }

    /// Returns true on success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The success outcome, if any.
    #[must_use]
    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            Self::Success(outcome) => Some(outcome),
            Self::Error(_) => None,
        }
    }

    /// The result identifier of a success, if any.
    #[must_use]
    pub fn result_id(&self) -> Option<&str> {
        self.outcome().and_then(|o| o.result_id.as_deref())
    }

    /// The error kind of a failure, if any.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success(_) => None,
            Self::Error(err) => Some(err.kind),
        }
    }
}

impl From<Result<Outcome, CommandError>> for HandlerResult {
    fn from(result: Result<Outcome, CommandError>) -> Self {
        match result {
            Ok(outcome) => Self::Success(outcome),
            Err(err) => Self::Error(err),
        }
    }
}

impl From<CommandError> for HandlerResult {
    fn from(err: CommandError) -> Self {
        Self::Error(err)
    }
}
