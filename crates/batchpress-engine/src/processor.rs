//! Batch processor driving one run from configuration to report

use crate::aggregator::ProgressAggregator;
use crate::inventory::FileInventory;
use crate::pool::{OutputMode, PoolRun, WorkerContext, WorkerPool};
use crate::retry::RetryExecutor;
use crate::task::{Job, RunReport};
use batchpress_compression::CompressorRegistry;
use batchpress_config::Config;
use batchpress_types::{Error, NullSink, Phase, ProgressSink, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Runs a whole batch: validate, scan, process, report
///
/// Run-level errors abort before any worker starts and leave the published
/// status in `Failed`. Per-file errors only show up in the report.
pub struct BatchProcessor {
    config: Config,
    registry: CompressorRegistry,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl BatchProcessor {
    /// Create a processor with compressors for the formats enabled in `config`
    pub fn new(config: Config) -> Self {
        let registry = CompressorRegistry::from_config(&config.compression);
        Self {
            config,
            registry,
            sink: Arc::new(NullSink),
            cancel: CancellationToken::new(),
        }
    }

    /// Use `registry` instead of the built-in compressors
    pub fn with_registry(mut self, registry: CompressorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Publish progress snapshots to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Stop dequeuing new files once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Configuration of this processor
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Token that cancels this run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute the run
    pub async fn run(&self) -> Result<RunReport> {
        let mut aggregator = ProgressAggregator::new(Arc::clone(&self.sink));

        let (jobs, mode) = match self.prepare(&mut aggregator).await {
            Ok(prepared) => prepared,
            Err(e) => {
                aggregator.fail(&e);
                return Err(e);
            }
        };

        let workers = self.config.worker_count();
        aggregator.set_total(jobs.len() as u64);
        aggregator.set_phase(Phase::Processing);
        info!(
            "Processing {} files with {} workers",
            jobs.len(),
            workers.get()
        );

        let context = WorkerContext {
            registry: self.registry.clone(),
            retry: RetryExecutor::new(self.config.retry_policy()),
            params: self.config.compression_params(),
            mode,
        };
        let PoolRun {
            mut results,
            handle,
        } = WorkerPool::new(context, workers, self.cancel.clone()).run(jobs);

        while let Some(outcome) = results.recv().await {
            aggregator.on_result(outcome);
        }

        let summary = handle
            .await
            .map_err(|e| Error::other(format!("worker pool failed: {}", e)))?;
        aggregator.record_skipped(summary.skipped);
        aggregator.complete();

        let report = aggregator.into_report();
        let snapshot = &report.snapshot;
        info!(
            "Run complete: {} succeeded, {} failed, {} skipped, {} bytes saved ({:.1}%)",
            snapshot.success_count,
            snapshot.fail_count,
            snapshot.skip_count,
            snapshot.saved_bytes,
            snapshot.average_ratio
        );
        Ok(report)
    }

    /// Validate the setup and build the job list
    async fn prepare(&self, aggregator: &mut ProgressAggregator) -> Result<(Vec<Job>, OutputMode)> {
        self.config.validate()?;
        if self.registry.is_empty() {
            return Err(Error::config("no compressor is registered for the enabled file types"));
        }

        aggregator.set_phase(Phase::Scanning);
        let scanner = &self.config.scanner;
        let source_root = Self::resolve_source(&scanner.source_directory).await?;

        let mode = if scanner.replace_original {
            OutputMode::Replace
        } else {
            let target_root = Self::prepare_target(&scanner.target_directory).await?;
            OutputMode::Mirror {
                source_root: source_root.clone(),
                target_root,
            }
        };

        let inventory = FileInventory::new(self.registry.extensions());
        let root = source_root.clone();
        let files = tokio::task::spawn_blocking(move || inventory.scan(&root))
            .await
            .map_err(|e| Error::other(format!("inventory task failed: {}", e)))?;

        if files.is_empty() {
            return Err(Error::NoFilesFound { path: source_root });
        }

        info!("Found {} files in {}", files.len(), source_root.display());
        Ok((files.into_iter().map(Job::new).collect(), mode))
    }

    async fn resolve_source(source: &Path) -> Result<PathBuf> {
        match tokio::fs::canonicalize(source).await {
            Ok(path) if path.is_dir() => Ok(path),
            _ => Err(Error::SourceNotFound {
                path: source.to_path_buf(),
            }),
        }
    }

    async fn prepare_target(target: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(target)
            .await
            .map_err(|e| Error::TargetDirectory {
                path: target.to_path_buf(),
                message: e.to_string(),
            })?;
        let resolved = tokio::fs::canonicalize(target)
            .await
            .map_err(|e| Error::TargetDirectory {
                path: target.to_path_buf(),
                message: e.to_string(),
            })?;
        debug!("Writing output under {}", resolved.display());
        Ok(resolved)
    }
}
