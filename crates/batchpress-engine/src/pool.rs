//! Worker pool
//!
//! A fixed number of tokio tasks pull jobs from one shared, pre-filled queue.
//! Each job yields exactly one [`Outcome`] on the result channel, including
//! jobs whose compressor panicked. The result channel closes once every
//! worker has been joined.

use crate::replace::replace_original;
use crate::retry::RetryExecutor;
use crate::task::Job;
use batchpress_compression::CompressorRegistry;
use batchpress_types::{CompressionParams, Error, Outcome, Result, WorkerCount};
use futures::FutureExt;
use std::any::Any;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Suffix of the compressed output written next to an original in replace mode
pub const TEMP_SUFFIX: &str = ".tmp";

/// Where compressed files are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Write `<original>.tmp`, then swap it over the original
    Replace,
    /// Write to the same relative path under `target_root`
    Mirror {
        /// Root the inputs are relative to
        source_root: PathBuf,
        /// Root of the output tree
        target_root: PathBuf,
    },
}

impl OutputMode {
    /// Output path for `input`, creating intermediate directories in mirror mode
    pub async fn resolve(&self, input: &Path) -> Result<PathBuf> {
        match self {
            Self::Replace => {
                let mut name = OsString::from(input.as_os_str());
                name.push(TEMP_SUFFIX);
                Ok(PathBuf::from(name))
            }
            Self::Mirror {
                source_root,
                target_root,
            } => {
                let relative = input.strip_prefix(source_root).map_err(|_| {
                    Error::io(format!(
                        "{} is not inside {}",
                        input.display(),
                        source_root.display()
                    ))
                })?;
                let output = target_root.join(relative);
                if let Some(parent) = output.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        Error::io(format!(
                            "failed to create output directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
                Ok(output)
            }
        }
    }
}

/// Everything a worker needs to process a job
#[derive(Debug, Clone)]
pub struct WorkerContext {
    /// Compressors by extension
    pub registry: CompressorRegistry,
    /// Retry policy wrapper
    pub retry: RetryExecutor,
    /// Compression parameters for every file
    pub params: CompressionParams,
    /// Output placement
    pub mode: OutputMode,
}

impl WorkerContext {
    /// Process one job into exactly one outcome
    pub async fn process(&self, job: Job) -> Outcome {
        let input = job.into_path();

        let Some(compressor) = self.registry.for_path(&input) else {
            return Outcome::failure(input.clone(), 0, Error::UnsupportedFormat { path: input });
        };

        let output = match self.mode.resolve(&input).await {
            Ok(output) => output,
            Err(e) => return Outcome::failure(input, 0, e),
        };

        let original_size = match tokio::fs::metadata(&input).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Outcome::failure(input.clone(), 0, Error::FileNotFound { path: input });
            }
            Err(e) => return Outcome::failure(input, 0, e.into()),
        };

        debug!(
            "Compressing {} ({} bytes) with {}",
            input.display(),
            original_size,
            compressor.name()
        );
        let outcome = self
            .retry
            .attempt(compressor.as_ref(), &input, &output, &self.params, original_size)
            .await;

        if !outcome.succeeded {
            discard(&output).await;
            return outcome;
        }
        if self.mode == OutputMode::Replace {
            return self.swap(outcome, output).await;
        }
        outcome
    }

    /// Failed outcome for a job whose processing panicked
    async fn panicked(&self, input: PathBuf, message: String) -> Outcome {
        error!("Processing {} panicked: {}", input.display(), message);
        if let Ok(output) = self.mode.resolve(&input).await {
            discard(&output).await;
        }
        Outcome::failure(input, 0, Error::other(format!("compressor panicked: {}", message)))
    }

    async fn swap(&self, outcome: Outcome, temp: PathBuf) -> Outcome {
        let original = outcome.source_path.clone();
        let temp_for_swap = temp.clone();

        // Runs to completion even if the run is cancelled meanwhile
        let swapped =
            tokio::task::spawn_blocking(move || replace_original(&original, &temp_for_swap))
                .await
                .unwrap_or_else(|e| {
                    Err(Error::replacement(&temp, format!("swap task failed: {}", e)))
                });

        match swapped {
            Ok(()) => outcome,
            Err(e) => {
                discard(&temp).await;
                outcome.into_failure(e)
            }
        }
    }
}

/// Remove an output that must not outlive a failed outcome
async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Summary of a finished pool run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolSummary {
    /// Workers that were spawned
    pub workers: usize,
    /// Jobs never started because the run was cancelled
    pub skipped: u64,
}

/// Handles of a running pool
#[derive(Debug)]
pub struct PoolRun {
    /// Outcomes in arrival order; closes after every worker exits
    pub results: mpsc::UnboundedReceiver<Outcome>,
    /// Resolves once the workers are joined
    pub handle: JoinHandle<PoolSummary>,
}

/// Bounded set of workers sharing one job queue
#[derive(Debug, Clone)]
pub struct WorkerPool {
    context: Arc<WorkerContext>,
    workers: WorkerCount,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Create a pool
    pub fn new(context: WorkerContext, workers: WorkerCount, cancel: CancellationToken) -> Self {
        Self {
            context: Arc::new(context),
            workers,
            cancel,
        }
    }

    /// Start processing `jobs`
    ///
    /// The queue is filled and closed before the first worker starts.
    pub fn run(&self, jobs: Vec<Job>) -> PoolRun {
        let (job_tx, job_rx) = mpsc::channel(jobs.len().max(1));
        for job in jobs {
            // Capacity equals the job count, so this cannot fail
            let _ = job_tx.try_send(job);
        }
        drop(job_tx);

        let queue = Arc::new(Mutex::new(job_rx));
        let (result_tx, results) = mpsc::unbounded_channel();
        let worker_count = self.workers.get();

        let workers: Vec<JoinHandle<()>> = (0..worker_count)
            .map(|id| {
                let queue = Arc::clone(&queue);
                let results = result_tx.clone();
                let context = Arc::clone(&self.context);
                let cancel = self.cancel.clone();
                tokio::spawn(worker_loop(id, queue, results, context, cancel))
            })
            .collect();

        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            for worker in futures::future::join_all(workers).await {
                if let Err(e) = worker {
                    error!("Worker task failed: {}", e);
                }
            }

            let mut leftover = Vec::new();
            {
                let mut queue = queue.lock().await;
                while let Ok(job) = queue.try_recv() {
                    leftover.push(job);
                }
            }

            let mut skipped = 0;
            if cancel.is_cancelled() {
                skipped = leftover.len() as u64;
            } else if !leftover.is_empty() {
                error!("{} jobs were still queued after every worker exited", leftover.len());
                for job in leftover {
                    let error = Error::other("no worker was left to process this file");
                    let _ = result_tx.send(Outcome::failure(job.into_path(), 0, error));
                }
            }
            drop(result_tx);

            PoolSummary {
                workers: worker_count,
                skipped,
            }
        });

        PoolRun { results, handle }
    }
}

async fn worker_loop(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::UnboundedSender<Outcome>,
    context: Arc<WorkerContext>,
    cancel: CancellationToken,
) {
    debug!("Worker {} started", id);
    loop {
        if cancel.is_cancelled() {
            debug!("Worker {} stopping on cancellation", id);
            break;
        }

        let job = queue.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        let input = job.path().to_path_buf();
        let outcome = match AssertUnwindSafe(context.process(job)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                context.panicked(input, message).await
            }
        };
        if results.send(outcome).is_err() {
            warn!("Worker {} lost its result channel", id);
            break;
        }
    }
    debug!("Worker {} finished", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use batchpress_types::{CompressionOutput, Compressor, RetryPolicy};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Writes half of the input to the output
    struct HalvingCompressor;

    #[async_trait]
    impl Compressor for HalvingCompressor {
        fn name(&self) -> &str {
            "halving"
        }

        fn extensions(&self) -> &[&'static str] {
            &["dat"]
        }

        async fn compress(
            &self,
            input: &Path,
            output: &Path,
            _params: &CompressionParams,
        ) -> Result<CompressionOutput> {
            let data = tokio::fs::read(input).await?;
            if data.starts_with(b"bad") {
                return Err(Error::compression("unreadable payload"));
            }
            if data.starts_with(b"partial") {
                tokio::fs::write(output, b"par").await?;
                return Err(Error::compression("encoder gave up halfway"));
            }
            if input.ends_with("boom.dat") {
                panic!("decoder state corrupted");
            }
            let half = &data[..data.len() / 2];
            tokio::fs::write(output, half).await?;
            Ok(CompressionOutput {
                compressed_size: half.len() as u64,
            })
        }
    }

    fn context(mode: OutputMode) -> WorkerContext {
        WorkerContext {
            registry: CompressorRegistry::new().with(Arc::new(HalvingCompressor)),
            retry: RetryExecutor::new(RetryPolicy::new(1, Duration::ZERO)),
            params: CompressionParams::default(),
            mode,
        }
    }

    async fn collect(run: PoolRun) -> (Vec<Outcome>, PoolSummary) {
        let PoolRun {
            mut results,
            handle,
        } = run;
        let mut outcomes = Vec::new();
        while let Some(outcome) = results.recv().await {
            outcomes.push(outcome);
        }
        (outcomes, handle.await.unwrap())
    }

    #[tokio::test]
    async fn test_one_outcome_per_job() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let mut jobs = Vec::new();
        for i in 0..10 {
            let path = source.path().join(format!("sub{}/f{}.dat", i % 3, i));
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, vec![b'x'; 100 + i]).unwrap();
            jobs.push(Job::new(path));
        }

        let mode = OutputMode::Mirror {
            source_root: source.path().to_path_buf(),
            target_root: target.path().to_path_buf(),
        };
        let pool = WorkerPool::new(context(mode), WorkerCount::new(3), CancellationToken::new());
        let (outcomes, summary) = collect(pool.run(jobs)).await;

        assert_eq!(outcomes.len(), 10);
        assert!(outcomes.iter().all(|o| o.succeeded));
        assert_eq!(summary, PoolSummary { workers: 3, skipped: 0 });
        assert_eq!(
            fs::read(target.path().join("sub1/f4.dat")).unwrap().len(),
            52
        );
    }

    #[tokio::test]
    async fn test_per_file_failures_do_not_stop_pool() {
        let source = TempDir::new().unwrap();
        let good = source.path().join("good.dat");
        let bad = source.path().join("bad.dat");
        let odd = source.path().join("odd.txt");
        let gone = source.path().join("gone.dat");
        fs::write(&good, b"0123456789").unwrap();
        fs::write(&bad, b"bad bytes").unwrap();
        fs::write(&odd, b"text").unwrap();

        let mode = OutputMode::Mirror {
            source_root: source.path().to_path_buf(),
            target_root: source.path().join("out"),
        };
        let pool = WorkerPool::new(context(mode), WorkerCount::new(0), CancellationToken::new());
        let jobs = vec![Job::new(&good), Job::new(&bad), Job::new(&odd), Job::new(&gone)];
        let (outcomes, summary) = collect(pool.run(jobs)).await;

        assert_eq!(summary.workers, 1);
        assert_eq!(outcomes.len(), 4);
        let by_path = |p: &Path| outcomes.iter().find(|o| o.source_path == p).unwrap();
        assert!(by_path(&good).succeeded);
        assert!(matches!(by_path(&bad).error, Some(Error::Compression { .. })));
        assert!(matches!(by_path(&odd).error, Some(Error::UnsupportedFormat { .. })));
        assert!(matches!(by_path(&gone).error, Some(Error::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn test_panicking_job_still_yields_outcome() {
        let source = TempDir::new().unwrap();
        let jobs: Vec<Job> = ["a.dat", "boom.dat", "c.dat"]
            .iter()
            .map(|name| {
                let path = source.path().join(name);
                fs::write(&path, b"0123456789").unwrap();
                Job::new(path)
            })
            .collect();

        let pool = WorkerPool::new(
            context(OutputMode::Replace),
            WorkerCount::new(1),
            CancellationToken::new(),
        );
        let (outcomes, summary) = collect(pool.run(jobs)).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(summary.skipped, 0);
        let boom = outcomes
            .iter()
            .find(|o| o.source_path.ends_with("boom.dat"))
            .unwrap();
        assert!(!boom.succeeded);
        assert!(
            matches!(&boom.error, Some(Error::Other { message }) if message.contains("panicked"))
        );
        assert_eq!(outcomes.iter().filter(|o| o.succeeded).count(), 2);
        assert_eq!(fs::read(source.path().join("c.dat")).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_failed_attempt_leaves_no_output() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let file = source.path().join("half.dat");
        fs::write(&file, b"partial write").unwrap();

        let mode = OutputMode::Mirror {
            source_root: source.path().to_path_buf(),
            target_root: target.path().to_path_buf(),
        };
        let pool = WorkerPool::new(context(mode), WorkerCount::new(1), CancellationToken::new());
        let (outcomes, _) = collect(pool.run(vec![Job::new(&file)])).await;

        assert!(!outcomes[0].succeeded);
        assert!(!target.path().join("half.dat").exists());
    }

    #[tokio::test]
    async fn test_replace_mode_swaps_in_place() {
        let source = TempDir::new().unwrap();
        let file = source.path().join("scan.dat");
        fs::write(&file, vec![b'z'; 64]).unwrap();

        let pool = WorkerPool::new(
            context(OutputMode::Replace),
            WorkerCount::new(2),
            CancellationToken::new(),
        );
        let (outcomes, _) = collect(pool.run(vec![Job::new(&file)])).await;

        assert!(outcomes[0].succeeded);
        assert_eq!(fs::read(&file).unwrap().len(), 32);
        assert!(!source.path().join("scan.dat.tmp").exists());
        assert!(!source.path().join("scan.dat.backup").exists());
    }

    #[tokio::test]
    async fn test_cancelled_pool_skips_everything() {
        let source = TempDir::new().unwrap();
        let jobs: Vec<Job> = (0..5)
            .map(|i| {
                let path = source.path().join(format!("{}.dat", i));
                fs::write(&path, b"abcd").unwrap();
                Job::new(path)
            })
            .collect();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let pool = WorkerPool::new(context(OutputMode::Replace), WorkerCount::new(2), cancel);
        let (outcomes, summary) = collect(pool.run(jobs)).await;

        assert!(outcomes.is_empty());
        assert_eq!(summary.skipped, 5);
    }

    #[tokio::test]
    async fn test_output_mode_resolution() {
        let root = TempDir::new().unwrap();
        let input = root.path().join("in").join("a").join("b.dat");

        let replace = OutputMode::Replace.resolve(&input).await.unwrap();
        assert_eq!(replace, root.path().join("in/a/b.dat.tmp"));

        let mirror = OutputMode::Mirror {
            source_root: root.path().join("in"),
            target_root: root.path().join("out"),
        };
        let output = mirror.resolve(&input).await.unwrap();
        assert_eq!(output, root.path().join("out/a/b.dat"));
        assert!(root.path().join("out/a").is_dir());

        let outside = mirror.resolve(Path::new("/elsewhere/c.dat")).await;
        assert!(outside.is_err());
    }
}
