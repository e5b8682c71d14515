//! The seam between the frame machinery and a scripting engine.

use std::time::Duration;

use twinframe_dispatch::PendingCallback;

use crate::fault::ScriptFault;

/// Per-frame context handed to each scripting pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameContext {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// Time since the previous frame started (zero for the first frame).
    pub delta: Duration,
}

/// A scripting engine driven by [`WorkerFrameJob`](crate::WorkerFrameJob).
///
/// All methods run on the worker thread while it holds the global execution
/// lock, so an implementation never sees concurrent calls. Panics are caught
/// at the call boundary and reported as [`FaultKind::Panic`](crate::FaultKind::Panic).
pub trait ScriptRuntime: Send + 'static {
    /// Runs the update pass: write state into back buffers.
    ///
    /// # Errors
    ///
    /// Returns a fault raised by script code.
    fn update(&mut self, frame: &FrameContext) -> Result<(), ScriptFault>;

    /// Runs the command-producing pass: submit commands to the main thread.
    ///
    /// # Errors
    ///
    /// Returns a fault raised by script code.
    fn produce_commands(&mut self, frame: &FrameContext) -> Result<(), ScriptFault> {
        let _ = frame;
        Ok(())
    }

    /// Delivers one ready command result to the callback that requested it.
    ///
    /// # Errors
    ///
    /// Returns a fault raised by the callback.
    fn invoke_callback(&mut self, callback: &PendingCallback) -> Result<(), ScriptFault>;
}
