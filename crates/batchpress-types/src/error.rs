//! Error types and handling for batchpress
//!
//! Errors fall into two families. Run-level errors (missing source directory,
//! uncreatable target, empty inventory, invalid configuration) abort a batch
//! before any worker starts. Everything else is a per-file error that ends up
//! inside an [`Outcome`](crate::Outcome) and never stops the pool.

use std::path::PathBuf;
use std::time::Duration;

/// Main error type for batchpress operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Input file not found
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found
        path: PathBuf,
    },

    /// Source directory of a run does not exist
    #[error("Source directory does not exist: {path}")]
    SourceNotFound {
        /// Configured source directory
        path: PathBuf,
    },

    /// Target directory could not be created
    #[error("Failed to create target directory {path}: {message}")]
    TargetDirectory {
        /// Configured target directory
        path: PathBuf,
        /// Underlying failure
        message: String,
    },

    /// The inventory found nothing to process
    #[error("No files found in {path}")]
    NoFilesFound {
        /// Scanned root
        path: PathBuf,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Compression error reported by a compressor
    #[error("Compression error: {message}")]
    Compression {
        /// Error message describing the compression issue
        message: String,
    },

    /// No compressor is registered for the file's format
    #[error("Unsupported file format: {path}")]
    UnsupportedFormat {
        /// Path of the rejected file
        path: PathBuf,
    },

    /// Swapping a compressed file over its original failed
    #[error("Failed to replace {path}: {message}")]
    Replacement {
        /// Original path that was being replaced
        path: PathBuf,
        /// Error message describing the failed step
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {limit:?}")]
    Timeout {
        /// Limit that was exceeded
        limit: Duration,
    },

    /// Operation abandoned before it finished
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O related errors
    Io,
    /// Errors found while validating the run setup
    Run,
    /// Configuration errors
    Config,
    /// Compression errors
    Compression,
    /// Replacement protocol errors
    Replacement,
    /// Timeout
    Timeout,
    /// Cancellation
    Cancelled,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::FileNotFound { .. } => ErrorKind::Io,
            Self::SourceNotFound { .. }
            | Self::TargetDirectory { .. }
            | Self::NoFilesFound { .. } => ErrorKind::Run,
            Self::Config { .. } => ErrorKind::Config,
            Self::Compression { .. } | Self::UnsupportedFormat { .. } => ErrorKind::Compression,
            Self::Replacement { .. } => ErrorKind::Replacement,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Check whether this error aborts a whole run rather than a single file
    pub fn is_run_level(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. }
                | Self::TargetDirectory { .. }
                | Self::NoFilesFound { .. }
                | Self::Config { .. }
        )
    }

    /// Check if another attempt at the same operation may succeed
    ///
    /// The retry executor stops early on errors that are not recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Compression { .. } | Self::Timeout { .. } | Self::Other { .. }
        )
    }

    /// Create a new I/O error from a message
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new compression error
    pub fn compression<S: Into<String>>(message: S) -> Self {
        Self::Compression {
            message: message.into(),
        }
    }

    /// Create a new replacement error
    pub fn replacement<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::Replacement {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}
