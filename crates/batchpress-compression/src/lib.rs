//! Compressors for batchpress
//!
//! Concrete implementations of the [`Compressor`](batchpress_types::Compressor)
//! port plus the registry that maps file extensions to them:
//!
//! - **JPEG**: downscale with Lanczos3 and re-encode at a reduced quality
//! - **PNG**: downscale large images and re-encode with maximum deflate effort
//! - **PDF**: strip document extras and recompress streams and images by level
//! - **Registry**: one compressor per lowercase extension, built from config
//!
//! Every compressor runs its codec work on tokio's blocking pool and keeps
//! the original bytes when re-encoding saves less than 5%.
//!
//! # Examples
//!
//! ```rust
//! use batchpress_compression::CompressorRegistry;
//! use batchpress_config::CompressionConfig;
//!
//! let registry = CompressorRegistry::from_config(&CompressionConfig::default());
//! assert!(registry.get("jpg").is_some());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod jpeg;
pub mod output;
pub mod pdf;
pub mod png;
pub mod registry;

pub use jpeg::JpegCompressor;
pub use pdf::PdfCompressor;
pub use png::PngCompressor;
pub use registry::CompressorRegistry;
