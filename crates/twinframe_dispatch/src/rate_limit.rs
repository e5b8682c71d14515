//! Per-agent rate limiting over a rolling one-second window.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::command::AgentId;

/// Length of the rolling window.
pub const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Caps accepted commands per agent per rolling window.
///
/// Only accepted commands occupy the window; rejections do not extend it.
#[derive(Debug, Default)]
pub struct RateLimiter {
    /// Accepted commands per window (0 = unlimited).
    limit: u32,
    /// Acceptance times within the current window, oldest first.
    windows: HashMap<AgentId, VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter. A limit of 0 disables limiting.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            windows: HashMap::new(),
        }
    }

    /// Current limit.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Changes the limit. Existing windows are kept.
    pub fn set_limit(&mut self, limit: u32) {
        self.limit = limit;
        if limit == 0 {
            self.windows.clear();
        }
    }

    /// Returns true and records the command if `agent` is under its limit
    /// at `now`.
    pub fn check(&mut self, agent: AgentId, now: Instant) -> bool {
        if self.limit == 0 {
            return true;
        }
        let window = self.windows.entry(agent).or_default();
        while let Some(&oldest) = window.front() {
            if now.saturating_duration_since(oldest) >= RATE_WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() >= self.limit as usize {
            return false;
        }
        window.push_back(now);
        true
    }

    /// Drops agents with no activity in the last window.
    pub fn prune(&mut self, now: Instant) {
        self.windows.retain(|_, window| {
            window
                .back()
                .is_some_and(|&last| now.saturating_duration_since(last) < RATE_WINDOW)
        });
    }

    /// Number of agents currently tracked.
    #[must_use]
    pub fn tracked_agents(&self) -> usize {
        self.windows.len()
    }
}
