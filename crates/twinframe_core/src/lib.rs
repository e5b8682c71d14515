//! # TWINFRAME Core
//!
//! Double-buffered state shared between the render thread and the script thread.
//!
//! ## Architecture Rules
//!
//! 1. **Main thread reads front, worker writes back** - never the other way around
//! 2. **One swap per frame** - only after the worker has finished its frame
//! 3. **Swap policy is explicit** - full copy or dirty-tracked, chosen per buffer
//!
//! ## Example
//!
//! ```rust,ignore
//! use twinframe_core::{StateBuffer, SwapPolicy};
//!
//! let entities = StateBuffer::<u32, String>::with_policy("entities", SwapPolicy::DirtyTracked);
//! entities.back().insert(1, "player".to_string());
//! entities.swap_buffers();
//! assert_eq!(entities.front().get(&1).map(String::as_str), Some("player"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod sync;

pub use config::RuntimeConfig;
pub use error::{TwinframeError, TwinframeResult};
pub use sync::{BackView, BufferSet, FrontView, Projection, StateBuffer, SwapBuffers, SwapPolicy};
