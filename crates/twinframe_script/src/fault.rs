//! # Script Faults
//!
//! A fault raised inside a scripting pass. Faults are caught by the worker,
//! logged, and reported in the frame report; they never unwind into the
//! frame loop.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Which pass was running when the fault was raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPhase {
    /// Delivering a command result to a script callback.
    Callback,
    /// The per-frame update pass.
    Update,
    /// The command-producing pass.
    Produce,
}

impl fmt::Display for FaultPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Callback => "callback",
            Self::Update => "update",
            Self::Produce => "produce",
        })
    }
}

/// Coarse classification of a fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Error in user script code.
    Runtime,
    /// The script used the host API incorrectly (unknown buffer, bad value).
    HostApiMisuse,
    /// Rust code called by the script panicked.
    Panic,
    /// The pass ran out of its operation budget.
    Timeout,
}

/// 1-based position in a script source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    /// Line number.
    pub line: u32,
    /// Column number.
    pub column: u32,
    /// Source name, when the runtime knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{source}:{}:{}", self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// A caught scripting fault with diagnostic context.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize)]
#[error("{phase} fault: {message}")]
pub struct ScriptFault {
    /// Pass that raised it.
    pub phase: FaultPhase,
    /// Classification.
    pub kind: FaultKind,
    /// Innermost error message.
    pub message: String,
    /// Where it was raised, if known.
    pub location: Option<SourceLocation>,
    /// Call stack, outermost first.
    pub stack: Vec<String>,
}

impl ScriptFault {
    /// Creates a fault without location or stack.
    #[must_use]
    pub fn new(phase: FaultPhase, kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            phase,
            kind,
            message: message.into(),
            location: None,
            stack: Vec::new(),
        }
    }

    /// A runtime error in script code.
    #[must_use]
    pub fn runtime(phase: FaultPhase, message: impl Into<String>) -> Self {
        Self::new(phase, FaultKind::Runtime, message)
    }

    /// A panic caught at the pass boundary.
    #[must_use]
    pub fn panic(phase: FaultPhase, message: impl Into<String>) -> Self {
        Self::new(phase, FaultKind::Panic, message)
    }

    /// Attaches a source location.
    #[must_use]
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Attaches a call stack.
    #[must_use]
    pub fn with_stack(mut self, stack: Vec<String>) -> Self {
        self.stack = stack;
        self
    }

    /// Emits this fault as a structured `tracing` error.
    pub fn log(&self, frame: u64) {
        let (line, column) = self
            .location
            .as_ref()
            .map_or((0, 0), |loc| (loc.line, loc.column));
        tracing::error!(
            frame,
            phase = %self.phase,
            kind = ?self.kind,
            line,
            column,
            stack = ?self.stack,
            "script fault: {}",
            self.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_builders() {
        let fault = ScriptFault::runtime(FaultPhase::Update, "x is not defined")
            .at(SourceLocation {
                line: 3,
                column: 7,
                source: Some("main.rhai".into()),
            })
            .with_stack(vec!["update @ 1:1".into()]);
        assert_eq!(fault.to_string(), "update fault: x is not defined");
        assert_eq!(
            fault.location.as_ref().map(ToString::to_string),
            Some("main.rhai:3:7".to_string())
        );
        assert_eq!(fault.stack.len(), 1);
    }

    #[test]
    fn test_serializes_for_diagnostics() {
        let fault = ScriptFault::panic(FaultPhase::Callback, "boom");
        let json = serde_json::to_value(&fault).unwrap();
        assert_eq!(json["phase"], "callback");
        assert_eq!(json["kind"], "panic");
        assert!(json["location"].is_null());
    }
}
