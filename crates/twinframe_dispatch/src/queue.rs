//! # Command Queue
//!
//! Bounded multi-producer/single-consumer FIFO from the script side to the
//! main thread.
//!
//! ```text
//!   Script thread ──┐
//!   Handler code  ──┼──> [bounded channel] ──> consume_all (main thread)
//!                   ┘      (try_send only)
//! ```
//!
//! Producers never block: a full queue rejects the command (backpressure).

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use twinframe_core::{TwinframeError, TwinframeResult};

use crate::command::Command;

/// Queue counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Commands offered to `submit`.
    pub submitted: u64,
    /// Commands accepted into the queue.
    pub accepted: u64,
    /// Commands dropped because the queue was full.
    pub rejected: u64,
    /// Commands handed to a `consume_all` visitor.
    pub consumed: u64,
}

/// Bounded command FIFO.
pub struct CommandQueue {
    sender: Sender<Command>,
    receiver: Receiver<Command>,
    capacity: usize,
    submitted: AtomicU64,
    rejected: AtomicU64,
    consumed: AtomicU64,
}

impl CommandQueue {
    /// Creates a queue holding at most `capacity` commands.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
            submitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
        }
    }

    /// Enqueues a command without blocking.
    ///
    /// Returns false and drops the command when the queue is full.
    pub fn submit(&self, command: Command) -> bool {
        self.try_submit(command).is_ok()
    }

    /// Enqueues a command without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`TwinframeError::QueueFull`] when the queue is at capacity.
    pub fn try_submit(&self, command: Command) -> TwinframeResult<()> {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        match self.sender.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command) | TrySendError::Disconnected(command)) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    command = %command.name,
                    agent = command.agent.0,
                    capacity = self.capacity,
                    "command queue full, dropping command"
                );
                Err(TwinframeError::QueueFull {
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Drains every command queued at the time of the call, in FIFO order.
    ///
    /// Main thread only. Commands submitted by the visitor itself are left
    /// for the next call, so a handler that re-submits cannot loop forever.
    /// Returns the number of commands visited.
    pub fn consume_all(&self, mut visitor: impl FnMut(Command)) -> usize {
        let pending = self.receiver.len();
        let mut visited = 0;
        for _ in 0..pending {
            match self.receiver.try_recv() {
                Ok(command) => {
                    visitor(command);
                    visited += 1;
                }
                Err(_) => break,
            }
        }
        self.consumed.fetch_add(visited as u64, Ordering::Relaxed);
        visited
    }

    /// Commands currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Configured bound.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let submitted = self.submitted.load(Ordering::Relaxed);
        let rejected = self.rejected.load(Ordering::Relaxed);
        QueueStats {
            submitted,
            accepted: submitted.saturating_sub(rejected),
            rejected,
            consumed: self.consumed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::AgentId;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    fn cmd(name: &str) -> Command {
        Command::new(name, json!(null), AgentId(1))
    }

    #[test]
    fn test_capacity_bound() {
        // capacity 2: A, B accepted; C rejected.
        let queue = CommandQueue::new(2);
        assert!(queue.submit(cmd("A")));
        assert!(queue.submit(cmd("B")));
        assert!(!queue.submit(cmd("C")));
        assert_eq!(queue.len(), 2);

        let mut seen = Vec::new();
        assert_eq!(queue.consume_all(|c| seen.push(c.name)), 2);
        assert_eq!(seen, vec!["A", "B"]);
        assert!(queue.is_empty());

        assert!(queue.submit(cmd("D")));
    }

    #[test]
    fn test_try_submit_reports_queue_full() {
        let queue = CommandQueue::new(1);
        queue.try_submit(cmd("A")).unwrap();
        assert_eq!(
            queue.try_submit(cmd("B")),
            Err(TwinframeError::QueueFull { capacity: 1 })
        );
    }

    #[test]
    fn test_submit_false_exactly_at_capacity() {
        let queue = CommandQueue::new(5);
        for i in 0..20 {
            let expected = queue.len() < queue.capacity();
            assert_eq!(queue.submit(cmd(&format!("c{i}"))), expected);
            if i % 7 == 6 {
                queue.consume_all(|_| {});
            }
        }
    }

    #[test]
    fn test_consume_all_on_empty_queue() {
        let queue = CommandQueue::new(4);
        assert_eq!(queue.consume_all(|_| panic!("nothing queued")), 0);
    }

    #[test]
    fn test_resubmission_deferred_to_next_drain() {
        let queue = CommandQueue::new(8);
        queue.submit(cmd("root"));

        let mut first = Vec::new();
        queue.consume_all(|c| {
            first.push(c.name.clone());
            assert!(queue.submit(cmd("derived")));
        });
        assert_eq!(first, vec!["root"]);
        assert_eq!(queue.len(), 1);

        let mut second = Vec::new();
        queue.consume_all(|c| second.push(c.name));
        assert_eq!(second, vec!["derived"]);
    }

    #[test]
    fn test_fifo_per_producer_under_contention() {
        let queue = Arc::new(CommandQueue::new(10_000));
        let producers: Vec<_> = (0..4u64)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..500 {
                        let command = Command::new(format!("{i}"), json!(i), AgentId(p));
                        assert!(queue.submit(command));
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let mut last = [-1i64; 4];
        let total = queue.consume_all(|c| {
            let seq: i64 = c.name.parse().unwrap();
            let slot = &mut last[c.agent.0 as usize];
            assert!(seq > *slot, "out of order for {}", c.agent);
            *slot = seq;
        });
        assert_eq!(total, 2_000);

        let stats = queue.stats();
        assert_eq!(stats.accepted, 2_000);
        assert_eq!(stats.consumed, 2_000);
        assert_eq!(stats.rejected, 0);
    }
}
