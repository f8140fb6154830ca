//! batchpress Integration Testing Suite
//!
//! This crate hosts the end-to-end tests of the batch pipeline together with
//! the fixtures they share: temporary source trees, a scripted compressor and
//! a snapshot-recording progress sink.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Unified test utilities
///
/// Fixtures shared by the integration tests.
pub mod test_utils;
