//! Result type alias for batchpress operations

use crate::Error;

/// Result type alias for batchpress operations
pub type Result<T> = std::result::Result<T, Error>;
