//! # Audit Log
//!
//! Bounded in-memory record of every dispatch, mirrored to `tracing` under
//! the `twinframe::audit` target. Purely observational: recording never
//! changes a dispatch outcome.

use std::collections::VecDeque;
use std::time::SystemTime;

use serde::Serialize;

use crate::command::AgentId;
use crate::result::{ErrorKind, HandlerResult};

/// How a dispatch ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "kind", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The handler succeeded.
    Success,
    /// The dispatch failed.
    Error(ErrorKind),
}

impl From<&HandlerResult> for AuditOutcome {
    fn from(result: &HandlerResult) -> Self {
        match result {
            HandlerResult::Success(_) => Self::Success,
            HandlerResult::Error(err) => Self::Error(err.kind),
        }
    }
}

/// One recorded dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    /// Command name.
    pub name: String,
    /// Submitting agent.
    pub agent: AgentId,
    /// Wall-clock dispatch time.
    pub timestamp: SystemTime,
    /// Dispatch outcome.
    pub outcome: AuditOutcome,
}

/// Bounded ring of audit records.
#[derive(Debug)]
pub struct AuditLog {
    enabled: bool,
    retention: usize,
    records: VecDeque<AuditRecord>,
    evicted: u64,
}

impl AuditLog {
    /// Creates a disabled log keeping at most `retention` records.
    #[must_use]
    pub fn new(retention: usize) -> Self {
        Self {
            enabled: false,
            retention: retention.max(1),
            records: VecDeque::new(),
            evicted: 0,
        }
    }

    /// Turns recording on or off.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns true if recording is on.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records a dispatch if enabled.
    pub fn record(&mut self, name: &str, agent: AgentId, outcome: AuditOutcome) {
        if !self.enabled {
            return;
        }
        tracing::info!(
            target: "twinframe::audit",
            command = name,
            agent = agent.0,
            outcome = ?outcome,
            "dispatch"
        );
        if self.records.len() == self.retention {
            self.records.pop_front();
            self.evicted += 1;
        }
        self.records.push_back(AuditRecord {
            name: name.to_string(),
            agent,
            timestamp: SystemTime::now(),
            outcome,
        });
    }

    /// Records currently retained, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &AuditRecord> {
        self.records.iter()
    }

    /// Removes and returns all retained records.
    pub fn drain(&mut self) -> Vec<AuditRecord> {
        self.records.drain(..).collect()
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records dropped to stay within retention.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
