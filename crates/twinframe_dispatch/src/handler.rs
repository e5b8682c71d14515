//! Handler trait and payload decoding at the handler boundary.

use std::any::Any;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::command::{AgentId, Command};
use crate::result::{CommandError, HandlerResult};

/// What a handler sees of the command it is serving.
#[derive(Clone, Copy, Debug)]
pub struct Invocation<'a> {
    /// Command name.
    pub name: &'a str,
    /// Submitting agent.
    pub agent: AgentId,
    /// Raw payload.
    pub payload: &'a Value,
    /// Submission time.
    pub submitted_at: Instant,
}

impl<'a> Invocation<'a> {
    /// Borrows a command as an invocation.
    #[must_use]
    pub fn of(command: &'a Command) -> Self {
        Self {
            name: &command.name,
            agent: command.agent,
            payload: &command.payload,
            submitted_at: command.submitted_at,
        }
    }

    /// Decodes the payload into the handler's payload type.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidPayload` error when the payload has the wrong shape.
    pub fn decode<P: DeserializeOwned>(&self) -> Result<P, CommandError> {
        P::deserialize(self.payload).map_err(|e| {
            CommandError::invalid_payload(format!("{}: {e}", self.name))
        })
    }
}

/// A registered command handler.
///
/// Closures of the shape `FnMut(&Invocation<'_>) -> HandlerResult` implement
/// this trait; implement it directly for handlers that carry state.
pub trait CommandHandler: Send {
    /// Serves one command on the calling (main) thread.
    fn handle(&mut self, invocation: &Invocation<'_>) -> HandlerResult;
}

impl<F> CommandHandler for F
where
    F: FnMut(&Invocation<'_>) -> HandlerResult + Send,
{
    fn handle(&mut self, invocation: &Invocation<'_>) -> HandlerResult {
        self(invocation)
    }
}

/// Adapts a closure over a typed payload into a [`CommandHandler`].
pub(crate) struct TypedHandler<P, F> {
    f: F,
    _payload: std::marker::PhantomData<fn() -> P>,
}

impl<P, F> TypedHandler<P, F>
where
    P: DeserializeOwned,
    F: FnMut(P, &Invocation<'_>) -> Result<crate::Outcome, CommandError> + Send,
{
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _payload: std::marker::PhantomData,
        }
    }
}

impl<P, F> CommandHandler for TypedHandler<P, F>
where
    P: DeserializeOwned,
    F: FnMut(P, &Invocation<'_>) -> Result<crate::Outcome, CommandError> + Send,
{
    fn handle(&mut self, invocation: &Invocation<'_>) -> HandlerResult {
        match invocation.decode::<P>() {
            Ok(payload) => (self.f)(payload, invocation).into(),
            Err(err) => HandlerResult::Error(err),
        }
    }
}

/// Wraps a closure over a typed payload as a [`CommandHandler`].
///
/// The payload is decoded before the closure runs; a decode failure becomes
/// an `InvalidPayload` result and the closure is not called.
pub fn typed_handler<P, F>(f: F) -> impl CommandHandler
where
    P: DeserializeOwned,
    F: FnMut(P, &Invocation<'_>) -> Result<crate::Outcome, CommandError> + Send,
{
    TypedHandler::new(f)
}

/// Extracts a readable message from a caught panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
