//! JSON output structures for batchpress runs

use batchpress_config::ScannerConfig;
use batchpress_engine::RunReport;
use batchpress_types::Phase;
use serde::{Deserialize, Serialize};

/// Complete JSON output of a run
#[derive(Debug, Serialize, Deserialize)]
pub struct RunReportJson {
    /// Operation metadata
    pub metadata: OperationMetadata,
    /// Aggregate counters
    pub stats: RunStatsJson,
    /// Files that could not be processed
    pub failures: Vec<FailureJson>,
    /// Overall result
    pub result: OperationResult,
}

/// Operation metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// batchpress version
    pub version: String,
    /// Operation type
    pub operation: String,
    /// Timestamp when the run started
    pub timestamp: String,
    /// Source directory
    pub source_path: String,
    /// Target directory, absent when replacing in place
    pub target_path: Option<String>,
    /// Whether originals were replaced
    pub replace_original: bool,
}

/// Run statistics in JSON format
#[derive(Debug, Serialize, Deserialize)]
pub struct RunStatsJson {
    /// Files found by the inventory
    pub total_files: u64,
    /// Files with an outcome
    pub processed_files: u64,
    /// Files compressed successfully
    pub success_count: u64,
    /// Files that failed
    pub fail_count: u64,
    /// Files never started because of cancellation
    pub skip_count: u64,
    /// Original bytes of successful files
    pub total_original_bytes: u64,
    /// Compressed bytes of successful files
    pub total_compressed_bytes: u64,
    /// Bytes saved, negative when outputs grew
    pub saved_bytes: i64,
    /// Savings in percent of the original bytes
    pub average_ratio: f64,
    /// Duration in seconds
    pub duration_seconds: f64,
}

/// One failed file
#[derive(Debug, Serialize, Deserialize)]
pub struct FailureJson {
    /// File path
    pub path: String,
    /// Error message
    pub error: String,
}

/// Overall run result
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResult {
    /// Whether every file was compressed
    pub success: bool,
    /// Terminal phase of the run
    pub phase: Phase,
    /// Result message
    pub message: String,
}

impl RunReportJson {
    /// Build the JSON view of `report`
    pub fn from_report(report: &RunReport, scanner: &ScannerConfig) -> Self {
        let snapshot = &report.snapshot;
        let success = report.is_completed() && !report.has_failures() && snapshot.skip_count == 0;
        let message = if success {
            format!("Compressed {} files", snapshot.success_count)
        } else {
            format!(
                "Compressed {} files, {} failed, {} skipped",
                snapshot.success_count, snapshot.fail_count, snapshot.skip_count
            )
        };

        Self {
            metadata: OperationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                operation: "run".to_string(),
                timestamp: snapshot.start_time.to_rfc3339(),
                source_path: scanner.source_directory.display().to_string(),
                target_path: (!scanner.replace_original)
                    .then(|| scanner.target_directory.display().to_string()),
                replace_original: scanner.replace_original,
            },
            stats: RunStatsJson {
                total_files: snapshot.total_files,
                processed_files: snapshot.processed_files,
                success_count: snapshot.success_count,
                fail_count: snapshot.fail_count,
                skip_count: snapshot.skip_count,
                total_original_bytes: snapshot.total_original_bytes,
                total_compressed_bytes: snapshot.total_compressed_bytes,
                saved_bytes: snapshot.saved_bytes,
                average_ratio: snapshot.average_ratio,
                duration_seconds: snapshot.elapsed.as_secs_f64(),
            },
            failures: report
                .failures
                .iter()
                .map(|f| FailureJson {
                    path: f.path.display().to_string(),
                    error: f.error.to_string(),
                })
                .collect(),
            result: OperationResult {
                success,
                phase: snapshot.phase,
                message,
            },
        }
    }
}
