//! # Synchronization Primitives for the Render/Script Split
//!
//! ## The Problem
//!
//! ```text
//! Script thread:  WRITE entity/camera/audio state
//! Render thread:  READ the same state, every frame, at a fixed rate
//!
//! Without synchronization: torn reads → CORRUPTED FRAME
//! With one shared Mutex:   render waits on script → STALL
//! ```
//!
//! ## The Solution: Double Buffering
//!
//! ```text
//! Frame N:
//!   Script writes to Back
//!   Render reads from Front (last published state)
//!
//! Frame boundary (script idle):
//!   SWAP: copy Back → Front (full or dirty keys), flip the front index
//! ```

mod buffer_set;
mod state_buffer;

pub use buffer_set::{BufferSet, SwapBuffers};
pub use state_buffer::{BackView, FrontView, Projection, StateBuffer, SwapPolicy};
