//! Retry executor wrapping a single compression call

use batchpress_types::{CompressionParams, Compressor, Error, Outcome, RetryPolicy};
use std::path::Path;
use tracing::{debug, warn};

/// Runs a compressor under a fixed-attempt, fixed-delay policy
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create an executor for `policy`
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Compress `input` into `output`, retrying on recoverable compressor errors
    ///
    /// Stops at the first success or at the first error that is not
    /// recoverable. The delay is slept only between failed attempts. When
    /// every attempt fails the outcome carries the last error.
    pub async fn attempt(
        &self,
        compressor: &dyn Compressor,
        input: &Path,
        output: &Path,
        params: &CompressionParams,
        original_size: u64,
    ) -> Outcome {
        let max_attempts = self.policy.max_attempts();
        let mut last_error = Error::other("no attempt was made");

        for attempt in 1..=max_attempts {
            match self.call(compressor, input, output, params).await {
                Ok(result) => {
                    debug!(
                        "{} compressed {} in attempt {}: {} -> {} bytes",
                        compressor.name(),
                        input.display(),
                        attempt,
                        original_size,
                        result.compressed_size
                    );
                    return Outcome::success(
                        input.to_path_buf(),
                        original_size,
                        result.compressed_size,
                    );
                }
                Err(error) if !error.is_recoverable() => {
                    debug!("Not retrying {}: {}", input.display(), error);
                    last_error = error;
                    break;
                }
                Err(error) => {
                    if attempt < max_attempts {
                        warn!(
                            "Retrying {} (attempt {}/{}): {}",
                            input.display(),
                            attempt,
                            max_attempts,
                            error
                        );
                        tokio::time::sleep(self.policy.delay()).await;
                    }
                    last_error = error;
                }
            }
        }

        Outcome::failure(input.to_path_buf(), original_size, last_error)
    }

    async fn call(
        &self,
        compressor: &dyn Compressor,
        input: &Path,
        output: &Path,
        params: &CompressionParams,
    ) -> batchpress_types::Result<batchpress_types::CompressionOutput> {
        match self.policy.timeout() {
            Some(limit) => tokio::time::timeout(limit, compressor.compress(input, output, params))
                .await
                .map_err(|_| Error::Timeout { limit })?,
            None => compressor.compress(input, output, params).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use batchpress_types::{CompressionOutput, Result};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` calls, then succeeds with `size`
    struct FlakyCompressor {
        failures: u32,
        size: u64,
        calls: AtomicU32,
    }

    impl FlakyCompressor {
        fn new(failures: u32, size: u64) -> Self {
            Self {
                failures,
                size,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Compressor for FlakyCompressor {
        fn name(&self) -> &str {
            "flaky"
        }

        fn extensions(&self) -> &[&'static str] {
            &["bin"]
        }

        async fn compress(
            &self,
            _input: &Path,
            _output: &Path,
            _params: &CompressionParams,
        ) -> Result<CompressionOutput> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(Error::compression(format!("failure {}", call)));
            }
            Ok(CompressionOutput {
                compressed_size: self.size,
            })
        }
    }

    /// Fails every call with the same error
    struct RejectingCompressor {
        error: Error,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Compressor for RejectingCompressor {
        fn name(&self) -> &str {
            "rejecting"
        }

        fn extensions(&self) -> &[&'static str] {
            &["bin"]
        }

        async fn compress(
            &self,
            _input: &Path,
            _output: &Path,
            _params: &CompressionParams,
        ) -> Result<CompressionOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        }
    }

    struct SlowCompressor;

    #[async_trait]
    impl Compressor for SlowCompressor {
        fn name(&self) -> &str {
            "slow"
        }

        fn extensions(&self) -> &[&'static str] {
            &["bin"]
        }

        async fn compress(
            &self,
            _input: &Path,
            _output: &Path,
            _params: &CompressionParams,
        ) -> Result<CompressionOutput> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(CompressionOutput { compressed_size: 1 })
        }
    }

    fn executor(attempts: u32) -> RetryExecutor {
        RetryExecutor::new(RetryPolicy::new(attempts, Duration::from_secs(2)))
    }

    async fn run(executor: RetryExecutor, compressor: &dyn Compressor, size: u64) -> Outcome {
        let params = CompressionParams::default();
        executor
            .attempt(compressor, Path::new("in.bin"), Path::new("out.bin"), &params, size)
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let compressor = FlakyCompressor::new(u32::MAX, 0);
        let started = tokio::time::Instant::now();

        let outcome = run(executor(3), &compressor, 1000).await;

        assert_eq!(compressor.calls(), 3);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.original_size, 1000);
        assert_eq!(outcome.error, Some(Error::compression("failure 3")));
        // Two pauses between three attempts, none after the last
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_first_success() {
        let compressor = FlakyCompressor::new(1, 400);

        let outcome = run(executor(3), &compressor, 1000).await;

        assert_eq!(compressor.calls(), 2);
        assert!(outcome.succeeded);
        assert_eq!(outcome.compressed_size, 400);
        assert_eq!(outcome.ratio, 60.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ineffective_compression_is_not_retried() {
        let compressor = FlakyCompressor::new(0, 1200);

        let outcome = run(executor(3), &compressor, 1000).await;

        assert_eq!(compressor.calls(), 1);
        assert!(outcome.succeeded);
        assert_eq!(outcome.saved_bytes, -200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_means_one() {
        let compressor = FlakyCompressor::new(u32::MAX, 0);

        let outcome = run(executor(0), &compressor, 10).await;

        assert_eq!(compressor.calls(), 1);
        assert!(!outcome.succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failed_attempt() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10))
            .with_timeout(Some(Duration::from_secs(5)));

        let outcome = run(RetryExecutor::new(policy), &SlowCompressor, 10).await;

        assert!(!outcome.succeeded);
        assert_eq!(
            outcome.error,
            Some(Error::Timeout {
                limit: Duration::from_secs(5)
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_second_timeout_is_reported_exactly() {
        let policy = RetryPolicy::new(1, Duration::ZERO)
            .with_timeout(Some(Duration::from_millis(250)));

        let outcome = run(RetryExecutor::new(policy), &SlowCompressor, 10).await;

        let error = outcome.error.unwrap();
        assert_eq!(
            error,
            Error::Timeout {
                limit: Duration::from_millis(250)
            }
        );
        assert_eq!(error.to_string(), "Operation timed out after 250ms");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecoverable_error_is_not_retried() {
        let compressor = RejectingCompressor {
            error: Error::Cancelled,
            calls: AtomicU32::new(0),
        };
        let started = tokio::time::Instant::now();

        let outcome = run(executor(3), &compressor, 10).await;

        assert_eq!(compressor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.error, Some(Error::Cancelled));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
