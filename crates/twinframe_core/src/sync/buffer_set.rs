//! Swap every registered buffer at the frame boundary.

use std::hash::Hash;
use std::sync::Arc;

use super::state_buffer::{Projection, StateBuffer};

/// Type-erased swap handle, so buffers of different key/value types can be
/// swapped together.
pub trait SwapBuffers: Send + Sync {
    /// Diagnostic name of the buffer.
    fn name(&self) -> &str;

    /// Publishes the back contents to the front.
    fn swap_buffers(&self);

    /// Number of completed swaps.
    fn swap_count(&self) -> u64;
}

impl<K, V, P> SwapBuffers for StateBuffer<K, V, P>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
    P: Projection<K, V>,
{
    fn name(&self) -> &str {
        StateBuffer::name(self)
    }

    fn swap_buffers(&self) {
        StateBuffer::swap_buffers(self);
    }

    fn swap_count(&self) -> u64 {
        StateBuffer::swap_count(self)
    }
}

/// Ordered set of buffers swapped together.
///
/// Buffers are swapped in registration order.
#[derive(Default)]
pub struct BufferSet {
    buffers: Vec<Arc<dyn SwapBuffers>>,
}

impl BufferSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a buffer. Setup time only.
    pub fn register(&mut self, buffer: Arc<dyn SwapBuffers>) {
        tracing::debug!(buffer = buffer.name(), "registered state buffer");
        self.buffers.push(buffer);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, buffer: Arc<dyn SwapBuffers>) -> Self {
        self.register(buffer);
        self
    }

    /// Swaps every buffer. Returns how many were swapped.
    pub fn swap_all(&self) -> usize {
        for buffer in &self.buffers {
            buffer.swap_buffers();
        }
        self.buffers.len()
    }

    /// Number of registered buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Returns true if no buffers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.buffers.iter().map(|b| b.name()).collect()
    }
}

impl std::fmt::Debug for BufferSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferSet")
            .field("buffers", &self.names())
            .finish()
    }
}
