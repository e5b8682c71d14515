//! Rhai errors as [`ScriptFault`]s.
//!
//! Errors raised inside script functions arrive wrapped in one
//! `ErrorInFunctionCall` per frame of the script call stack. The wrappers
//! become the fault's stack; the innermost error supplies kind, message,
//! and location.

use rhai::{EvalAltResult, Position};

use super::world::HOST_API_MISUSE;
use crate::fault::{FaultKind, FaultPhase, ScriptFault, SourceLocation};

/// Converts an evaluation error raised during `phase`.
pub(crate) fn fault_from_eval(
    phase: FaultPhase,
    err: &EvalAltResult,
    source: Option<&str>,
) -> ScriptFault {
    let mut stack = Vec::new();
    let mut innermost = err;
    let mut call_site = Position::NONE;

    while let EvalAltResult::ErrorInFunctionCall(name, _, inner, pos) = innermost {
        stack.push(match location(*pos, None) {
            Some(loc) => format!("{name} @ {loc}"),
            None => name.clone(),
        });
        call_site = *pos;
        innermost = inner.as_ref();
    }

    let position = if innermost.position().is_none() {
        call_site
    } else {
        innermost.position()
    };

    let fault = ScriptFault::new(phase, classify(innermost), message_of(innermost))
        .with_stack(stack);
    match location(position, source) {
        Some(loc) => fault.at(loc),
        None => fault,
    }
}

fn classify(err: &EvalAltResult) -> FaultKind {
    match err {
        EvalAltResult::ErrorTooManyOperations(_) => FaultKind::Timeout,
        EvalAltResult::ErrorFunctionNotFound(..)
        | EvalAltResult::ErrorMismatchDataType(..)
        | EvalAltResult::ErrorPropertyNotFound(..) => FaultKind::HostApiMisuse,
        EvalAltResult::ErrorRuntime(value, _) if value.to_string().starts_with(HOST_API_MISUSE) => {
            FaultKind::HostApiMisuse
        }
        _ => FaultKind::Runtime,
    }
}

/// Message without Rhai's trailing position suffix.
fn message_of(err: &EvalAltResult) -> String {
    match err {
        EvalAltResult::ErrorRuntime(value, _) => value.to_string(),
        other => {
            let text = other.to_string();
            match text.rfind(" (line ") {
                Some(cut) => text[..cut].to_string(),
                None => text,
            }
        }
    }
}

fn location(pos: Position, source: Option<&str>) -> Option<SourceLocation> {
    let line = u32::try_from(pos.line()?).ok()?;
    let column = pos
        .position()
        .and_then(|c| u32::try_from(c).ok())
        .unwrap_or(1)
        .max(1);
    Some(SourceLocation {
        line,
        column,
        source: source.map(str::to_string),
    })
}
