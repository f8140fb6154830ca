//! Progress aggregation
//!
//! The aggregator is the single owner of the mutable run status. It consumes
//! outcomes in arrival order and publishes one snapshot after each of them.

use crate::task::RunReport;
use batchpress_types::{Error, FileFailure, Outcome, Phase, ProgressSink, RunSnapshot, RunStatus};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Sink forwarding snapshots into an unbounded channel
///
/// Never blocks the aggregator. Snapshots sent after the receiver is gone are dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RunSnapshot>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn publish(&self, snapshot: RunSnapshot) {
        let _ = self.tx.send(snapshot);
    }
}

/// Accumulates outcomes into a [`RunStatus`] and publishes snapshots
pub struct ProgressAggregator {
    status: RunStatus,
    started: Instant,
    sink: Arc<dyn ProgressSink>,
    failures: Vec<FileFailure>,
}

impl ProgressAggregator {
    /// Create an aggregator in the `Initializing` phase
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            status: RunStatus::new(Utc::now()),
            started: Instant::now(),
            sink,
            failures: Vec::new(),
        }
    }

    /// Move to `phase` and publish
    pub fn set_phase(&mut self, phase: Phase) {
        if !self.status.set_phase(phase) {
            warn!(
                "Ignoring phase change from {} to {}",
                self.status.phase(),
                phase
            );
            return;
        }
        self.status.update_timing(self.started.elapsed());
        self.publish();
    }

    /// Record the inventory size
    pub fn set_total(&mut self, total_files: u64) {
        self.status.set_total(total_files);
    }

    /// Account for one outcome and publish
    pub fn on_result(&mut self, outcome: Outcome) {
        if self.status.is_complete() {
            warn!(
                "Dropping outcome for {} received after the run finished",
                outcome.source_path.display()
            );
            return;
        }

        if let Some(failure) = RunReport::failure_of(&outcome) {
            error!(
                "Failed to process {}: {}",
                failure.path.display(),
                failure.error
            );
            self.failures.push(failure);
        }

        self.status.record(&outcome, self.started.elapsed());
        self.publish();
    }

    /// Account for jobs that were never started
    pub fn record_skipped(&mut self, count: u64) {
        if count > 0 {
            warn!("{} files were skipped because the run was cancelled", count);
            self.status.record_skipped(count);
        }
    }

    /// Finish the run, whatever the per-file results
    pub fn complete(&mut self) {
        self.status.complete(self.started.elapsed());
        self.publish();
    }

    /// Abort the run with a run-level error
    pub fn fail(&mut self, error: &Error) {
        self.status.fail(error, self.started.elapsed());
        self.publish();
    }

    /// Current snapshot
    pub fn snapshot(&self) -> RunSnapshot {
        self.status.snapshot()
    }

    /// Consume the aggregator into the final report
    pub fn into_report(self) -> RunReport {
        RunReport {
            snapshot: self.status.snapshot(),
            failures: self.failures,
        }
    }

    fn publish(&self) {
        self.sink.publish(self.status.snapshot());
    }
}
