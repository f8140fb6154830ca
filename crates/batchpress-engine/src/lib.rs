//! Batch processing engine for batchpress
//!
//! This crate runs the concurrent compression pipeline:
//!
//! - **Inventory**: extension-filtered recursive listing of the source tree
//! - **Retry executor**: fixed-attempt, fixed-delay wrapper around one compressor call
//! - **Replacement protocol**: backup, swap and cleanup with rollback
//! - **Worker pool**: bounded tokio workers over one shared job queue
//! - **Aggregator**: single owner of the run status, publishing snapshots
//! - **Processor**: validation, phases and the final report
//!
//! # Examples
//!
//! ```rust,no_run
//! use batchpress_config::Config;
//! use batchpress_engine::BatchProcessor;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let processor = BatchProcessor::new(Config::default())
//!     .with_sink(Arc::new(|snapshot: batchpress_types::RunSnapshot| {
//!         println!("{:.0}%", snapshot.progress);
//!     }));
//! let report = processor.run().await?;
//! println!("Saved {} bytes", report.snapshot.saved_bytes);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregator;
pub mod inventory;
pub mod pool;
pub mod processor;
pub mod replace;
pub mod retry;
pub mod task;

pub use aggregator::{ChannelSink, ProgressAggregator};
pub use inventory::FileInventory;
pub use pool::{OutputMode, PoolRun, PoolSummary, WorkerContext, WorkerPool};
pub use processor::BatchProcessor;
pub use replace::{backup_path, replace_original};
pub use retry::RetryExecutor;
pub use task::{Job, RunReport};

pub use tokio_util::sync::CancellationToken;
