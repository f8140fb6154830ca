//! Jobs handed to workers and the report returned from a run

use batchpress_types::{FileFailure, Outcome, Phase, RunSnapshot};
use std::path::{Path, PathBuf};

/// One input file waiting for a worker
///
/// Consumed exactly once by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    path: PathBuf,
}

impl Job {
    /// Create a job for an input file
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Input file of this job
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the input path out of the job
    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

/// Final result of a batch run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Last published snapshot
    pub snapshot: RunSnapshot,
    /// Every file that failed, in arrival order
    pub failures: Vec<FileFailure>,
}

impl RunReport {
    /// Check whether the run reached `Completed`
    pub fn is_completed(&self) -> bool {
        self.snapshot.phase == Phase::Completed
    }

    /// Check whether any file failed
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Failure entry for a failed outcome, if it carries an error
    pub(crate) fn failure_of(outcome: &Outcome) -> Option<FileFailure> {
        if outcome.succeeded {
            return None;
        }
        outcome.error.clone().map(|error| FileFailure {
            path: outcome.source_path.clone(),
            error,
        })
    }
}
