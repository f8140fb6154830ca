//! Core traits for batchpress
//!
//! The two seams of the pipeline: the compression port that workers call and
//! the progress sink that the aggregator publishes to.

use crate::{CompressionParams, Result, RunSnapshot};
use async_trait::async_trait;
use std::path::Path;

/// What a compressor reports back after writing its output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOutput {
    /// Size of the written output in bytes
    pub compressed_size: u64,
}

/// Compression port
///
/// Implementations read `input` and write the reduced file to `output`.
/// A call must be idempotent and must not leave a partial `output` behind
/// when it fails. An output that is not smaller than the input is still a
/// success.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use batchpress_types::{CompressionOutput, CompressionParams, Compressor, Result};
/// use std::path::Path;
///
/// struct Passthrough;
///
/// #[async_trait]
/// impl Compressor for Passthrough {
///     fn name(&self) -> &str {
///         "passthrough"
///     }
///
///     fn extensions(&self) -> &[&'static str] {
///         &["raw"]
///     }
///
///     async fn compress(
///         &self,
///         _input: &Path,
///         _output: &Path,
///         _params: &CompressionParams,
///     ) -> Result<CompressionOutput> {
///         Ok(CompressionOutput { compressed_size: 0 })
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let output = Passthrough
///     .compress(Path::new("a.raw"), Path::new("b.raw"), &CompressionParams::default())
///     .await
///     .unwrap();
/// assert_eq!(output.compressed_size, 0);
/// # });
/// ```
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Short human-readable name used in logs
    fn name(&self) -> &str;

    /// Lowercase file extensions this compressor accepts, without the dot
    fn extensions(&self) -> &[&'static str];

    /// Compress one file
    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        params: &CompressionParams,
    ) -> Result<CompressionOutput>;
}

/// Receiver of progress snapshots
///
/// Called once per published snapshot from the aggregator. Implementations
/// must return quickly; rendering belongs on the other side of a channel.
pub trait ProgressSink: Send + Sync {
    /// Accept one snapshot
    fn publish(&self, snapshot: RunSnapshot);
}

impl<F> ProgressSink for F
where
    F: Fn(RunSnapshot) + Send + Sync,
{
    fn publish(&self, snapshot: RunSnapshot) {
        self(snapshot);
    }
}

/// Sink that drops every snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn publish(&self, _snapshot: RunSnapshot) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, RunStatus};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    struct FixedCompressor;

    #[async_trait]
    impl Compressor for FixedCompressor {
        fn name(&self) -> &str {
            "fixed"
        }

        fn extensions(&self) -> &[&'static str] {
            &["bin"]
        }

        async fn compress(
            &self,
            input: &Path,
            _output: &Path,
            _params: &CompressionParams,
        ) -> Result<CompressionOutput> {
            if input.ends_with("bad.bin") {
                return Err(Error::compression("bad input"));
            }
            Ok(CompressionOutput { compressed_size: 42 })
        }
    }

    #[tokio::test]
    async fn test_compressor_object_safety() {
        let compressor: Arc<dyn Compressor> = Arc::new(FixedCompressor);
        let params = CompressionParams::default();

        let ok = compressor
            .compress(Path::new("good.bin"), Path::new("out.bin"), &params)
            .await;
        assert_eq!(ok, Ok(CompressionOutput { compressed_size: 42 }));

        let err = compressor
            .compress(Path::new("bad.bin"), Path::new("out.bin"), &params)
            .await;
        assert!(err.is_err());
        assert_eq!(compressor.extensions(), &["bin"]);
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&seen);
        let sink = move |snapshot: RunSnapshot| {
            counter.fetch_add(snapshot.total_files, Ordering::SeqCst);
        };

        let mut status = RunStatus::default();
        status.set_total(3);
        sink.publish(status.snapshot());
        sink.publish(status.snapshot());
        NullSink.publish(status.snapshot());

        assert_eq!(seen.load(Ordering::SeqCst), 6);
    }
}
