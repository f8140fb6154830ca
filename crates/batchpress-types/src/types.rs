//! Core data types for batchpress
//!
//! Per-file outcomes, the run phase machine and the aggregate run status that
//! the progress aggregator mutates and publishes as immutable snapshots.

use crate::Error;
use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// File size in bytes
pub type FileSize = u64;

/// Result of processing one file
///
/// Produced by exactly one worker and moved once to the aggregator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Outcome {
    /// Input file the outcome belongs to
    pub source_path: PathBuf,
    /// Size of the input before compression
    pub original_size: FileSize,
    /// Size of the produced output
    pub compressed_size: FileSize,
    /// Space saved in percent of the original, negative when the output grew
    pub ratio: f64,
    /// `original_size - compressed_size`, negative when the output grew
    pub saved_bytes: i64,
    /// Whether the file was processed successfully
    pub succeeded: bool,
    /// Error of the last failed step, if any
    pub error: Option<Error>,
}

impl Outcome {
    /// Create a successful outcome from the two sizes
    pub fn success(
        source_path: PathBuf,
        original_size: FileSize,
        compressed_size: FileSize,
    ) -> Self {
        Self {
            source_path,
            original_size,
            compressed_size,
            ratio: savings_ratio(original_size, compressed_size),
            saved_bytes: original_size as i64 - compressed_size as i64,
            succeeded: true,
            error: None,
        }
    }

    /// Create a failed outcome
    ///
    /// A failed file saves nothing, so the compressed size mirrors the original.
    pub fn failure(source_path: PathBuf, original_size: FileSize, error: Error) -> Self {
        Self {
            source_path,
            original_size,
            compressed_size: original_size,
            ratio: 0.0,
            saved_bytes: 0,
            succeeded: false,
            error: Some(error),
        }
    }

    /// Turn this outcome into a failure, keeping the original size
    pub fn into_failure(self, error: Error) -> Self {
        Self::failure(self.source_path, self.original_size, error)
    }
}

/// Percentage of `original` saved by shrinking it to `compressed`
///
/// Zero when `original` is zero. Never clamped.
pub fn savings_ratio(original: FileSize, compressed: FileSize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (original as f64 - compressed as f64) / original as f64 * 100.0
}

/// Phase of a batch run
///
/// Phases only move forward. `Failed` is reachable from every non-terminal
/// phase; `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Phase {
    /// Configuration is being validated
    #[default]
    Initializing,
    /// The source tree is being listed
    Scanning,
    /// Workers are compressing files
    Processing,
    /// Reserved for a bulk swap step after processing
    ///
    /// The pipeline swaps each file over its original as soon as that file
    /// is compressed, so runs go from `Processing` straight to `Completed`
    /// and never publish this phase.
    Replacing,
    /// The run finished, possibly with per-file failures
    Completed,
    /// The run aborted with a run-level error
    Failed,
}

impl Phase {
    fn rank(self) -> u8 {
        match self {
            Self::Initializing => 0,
            Self::Scanning => 1,
            Self::Processing => 2,
            Self::Replacing => 3,
            Self::Completed | Self::Failed => 4,
        }
    }

    /// Check if no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if moving to `next` keeps the phase order
    pub fn can_transition_to(self, next: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || next.rank() > self.rank()
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::Scanning => "scanning",
            Self::Processing => "processing",
            Self::Replacing => "replacing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Immutable copy of the run status handed to progress sinks
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunSnapshot {
    /// Current phase
    pub phase: Phase,
    /// Number of files found by the inventory
    pub total_files: u64,
    /// Files with a published outcome
    pub processed_files: u64,
    /// Files processed successfully
    pub success_count: u64,
    /// Files that failed
    pub fail_count: u64,
    /// Files never started because the run was cancelled
    pub skip_count: u64,
    /// Sum of original sizes of successful files
    pub total_original_bytes: u64,
    /// Sum of compressed sizes of successful files
    pub total_compressed_bytes: u64,
    /// `total_original_bytes - total_compressed_bytes`
    pub saved_bytes: i64,
    /// Savings percentage over the cumulative totals
    pub average_ratio: f64,
    /// Completion percentage
    pub progress: f64,
    /// File of the most recent outcome
    pub current_file: Option<PathBuf>,
    /// Wall clock start of the run
    pub start_time: DateTime<Utc>,
    /// Time since the run started
    pub elapsed: Duration,
    /// Estimated time until the last file is processed
    pub estimated_remaining: Duration,
    /// Set once the run reached a terminal phase
    pub is_complete: bool,
    /// Message of the most recent error
    pub last_error: Option<String>,
}

/// File that failed, as listed in the final report
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileFailure {
    /// Failed input
    pub path: PathBuf,
    /// Error recorded in its outcome
    pub error: Error,
}

/// Mutable aggregate status of a run
///
/// Owned by a single aggregator. Once `is_complete` is set, every mutator is
/// a no-op.
#[derive(Debug, Clone)]
pub struct RunStatus {
    phase: Phase,
    total_files: u64,
    processed_files: u64,
    success_count: u64,
    fail_count: u64,
    skip_count: u64,
    total_original_bytes: u64,
    total_compressed_bytes: u64,
    current_file: Option<PathBuf>,
    start_time: DateTime<Utc>,
    elapsed: Duration,
    estimated_remaining: Duration,
    progress: f64,
    is_complete: bool,
    last_error: Option<String>,
}

impl RunStatus {
    /// Create a status in the `Initializing` phase
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            phase: Phase::Initializing,
            total_files: 0,
            processed_files: 0,
            success_count: 0,
            fail_count: 0,
            skip_count: 0,
            total_original_bytes: 0,
            total_compressed_bytes: 0,
            current_file: None,
            start_time,
            elapsed: Duration::ZERO,
            estimated_remaining: Duration::ZERO,
            progress: 0.0,
            is_complete: false,
            last_error: None,
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the run reached a terminal phase
    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Move to `phase`; returns `false` and changes nothing when the
    /// transition would go backwards or leave a terminal phase
    pub fn set_phase(&mut self, phase: Phase) -> bool {
        if !self.phase.can_transition_to(phase) {
            return false;
        }
        self.phase = phase;
        true
    }

    /// Record the size of the inventory
    pub fn set_total(&mut self, total_files: u64) {
        if self.is_complete {
            return;
        }
        self.total_files = total_files;
    }

    /// Account for one outcome, in arrival order
    pub fn record(&mut self, outcome: &Outcome, elapsed: Duration) {
        if self.is_complete {
            return;
        }

        self.processed_files += 1;
        if outcome.succeeded {
            self.success_count += 1;
            self.total_original_bytes += outcome.original_size;
            self.total_compressed_bytes += outcome.compressed_size;
        } else {
            self.fail_count += 1;
            if let Some(error) = &outcome.error {
                self.last_error = Some(error.to_string());
            }
        }
        self.current_file = Some(outcome.source_path.clone());
        self.update_timing(elapsed);
    }

    /// Account for jobs that were never started
    pub fn record_skipped(&mut self, count: u64) {
        if self.is_complete {
            return;
        }
        self.skip_count += count;
    }

    /// Refresh elapsed time, progress and the remaining-time estimate
    pub fn update_timing(&mut self, elapsed: Duration) {
        if self.is_complete {
            return;
        }

        self.elapsed = elapsed;
        if self.total_files > 0 {
            self.progress = self.processed_files as f64 / self.total_files as f64 * 100.0;
        }

        let remaining = self.total_files.saturating_sub(self.processed_files);
        self.estimated_remaining = if self.processed_files > 0 && remaining > 0 {
            elapsed.div_f64(self.processed_files as f64).mul_f64(remaining as f64)
        } else {
            Duration::ZERO
        };
    }

    /// Mark the run as completed, regardless of per-file failures
    pub fn complete(&mut self, elapsed: Duration) {
        if self.is_complete {
            return;
        }
        self.phase = Phase::Completed;
        self.elapsed = elapsed;
        self.progress = 100.0;
        self.estimated_remaining = Duration::ZERO;
        self.current_file = None;
        self.is_complete = true;
    }

    /// Mark the run as failed with a run-level error
    pub fn fail(&mut self, error: &Error, elapsed: Duration) {
        if self.is_complete {
            return;
        }
        self.phase = Phase::Failed;
        self.elapsed = elapsed;
        self.estimated_remaining = Duration::ZERO;
        self.last_error = Some(error.to_string());
        self.is_complete = true;
    }

    /// Savings percentage over the cumulative byte totals
    pub fn average_ratio(&self) -> f64 {
        savings_ratio(self.total_original_bytes, self.total_compressed_bytes)
    }

    /// Take an immutable copy for publishing
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            phase: self.phase,
            total_files: self.total_files,
            processed_files: self.processed_files,
            success_count: self.success_count,
            fail_count: self.fail_count,
            skip_count: self.skip_count,
            total_original_bytes: self.total_original_bytes,
            total_compressed_bytes: self.total_compressed_bytes,
            saved_bytes: self.total_original_bytes as i64 - self.total_compressed_bytes as i64,
            average_ratio: self.average_ratio(),
            progress: self.progress,
            current_file: self.current_file.clone(),
            start_time: self.start_time,
            elapsed: self.elapsed,
            estimated_remaining: self.estimated_remaining,
            is_complete: self.is_complete,
            last_error: self.last_error.clone(),
        }
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}
