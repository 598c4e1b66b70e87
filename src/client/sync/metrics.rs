//! # Bridge Metrics
//!
//! Counters of the persistence bridge.
//!
//! ## Features
//!
//! - **Call Counts**: creates, updates and deletes issued to the backend
//! - **Error Tracking**: failed calls and the resulting success rate
//! - **Suppression**: changes that never reached the backend and why

use std::time::Duration;
use tokio::time::Instant;

/// Kind of backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeMetrics {
    pub creates_issued: u64,
    pub updates_issued: u64,
    pub deletes_issued: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    /// Updates dropped because nothing significant changed
    pub suppressed_changes: u64,
    /// Updates or deletes skipped because the node was never persisted
    pub skipped_not_durable: u64,
    /// Creates held back until the parent had a server id
    pub deferred_creates: u64,
    /// Position updates collapsed into a later one by the debounce
    pub coalesced_updates: u64,
    /// Events from peers, bootstrap or server-id merges
    pub ignored_events: u64,
    pub average_call_duration: Duration,
    pub last_call_duration: Option<Duration>,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a call and return its start time
    pub fn record_call_start(&mut self, kind: CallKind) -> Instant {
        match kind {
            CallKind::Create => self.creates_issued += 1,
            CallKind::Update => self.updates_issued += 1,
            CallKind::Delete => self.deletes_issued += 1,
        }
        Instant::now()
    }

    pub fn record_call_success(&mut self, started: Instant) {
        let duration = started.elapsed();
        self.last_call_duration = Some(duration);
        self.successful_calls += 1;

        // Update rolling average
        let total = self.average_call_duration * (self.successful_calls - 1) as u32 + duration;
        self.average_call_duration = total / self.successful_calls as u32;
    }

    pub fn record_call_failure(&mut self) {
        self.failed_calls += 1;
    }

    /// Total calls issued
    pub fn total_calls(&self) -> u64 {
        self.creates_issued + self.updates_issued + self.deletes_issued
    }

    pub fn success_rate(&self) -> f64 {
        let settled = self.successful_calls + self.failed_calls;
        if settled == 0 {
            0.0
        } else {
            self.successful_calls as f64 / settled as f64
        }
    }
}
