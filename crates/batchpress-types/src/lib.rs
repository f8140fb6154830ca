//! Core type system and error handling for batchpress
//!
//! This crate provides the foundational types shared by every batchpress crate:
//!
//! - **Error handling**: run-level and per-file errors, and which of them are worth retrying
//! - **Outcomes**: per-file results and their size arithmetic
//! - **Run status**: the phase machine and aggregate counters published as snapshots
//! - **Traits**: the `Compressor` port and the `ProgressSink` seam
//! - **Configuration**: validated levels, qualities and retry policy
//!
//! # Features
//!
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use batchpress_types::{Outcome, RunStatus};
//! use std::path::PathBuf;
//! use std::time::Duration;
//!
//! let mut status = RunStatus::default();
//! status.set_total(1);
//! status.record(&Outcome::success(PathBuf::from("a.jpg"), 1000, 400), Duration::from_secs(1));
//! assert_eq!(status.snapshot().average_ratio, 60.0);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{
    CompressionFlags, CompressionLevel, CompressionParams, ImageQuality, RetryPolicy, WorkerCount,
};
pub use error::{Error, ErrorKind};
pub use result::Result;
pub use traits::*;
pub use types::*;
