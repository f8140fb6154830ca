//! Configuration management system for batchpress
//!
//! Layered configuration for a batch run: built-in defaults, then a config
//! file (YAML, TOML or JSON by extension), then `BATCHPRESS__*` environment
//! variables. Command line overrides are applied by the binary on top of the
//! loaded [`Config`] before it is validated.
//!
//! # Examples
//!
//! ```rust,no_run
//! use batchpress_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("batchpress.yaml")
//!     .add_env_prefix("BATCHPRESS")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Workers: {}", config.processing.parallel_workers);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use batchpress_types::{
    CompressionLevel, CompressionParams, ImageQuality, RetryPolicy, WorkerCount,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Log levels accepted by `output.log_level`
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for batchpress
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Where files come from and where they go
    pub scanner: ScannerConfig,
    /// Compression level and enabled formats
    pub compression: CompressionConfig,
    /// Worker pool and retry settings
    pub processing: ProcessingConfig,
    /// Logging and progress display
    pub output: OutputConfig,
}

/// Source and target locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Root of the tree to process
    pub source_directory: PathBuf,
    /// Root of the mirrored output tree, unused when replacing in place
    pub target_directory: PathBuf,
    /// Overwrite originals instead of writing to the target tree
    pub replace_original: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            source_directory: PathBuf::from("./input"),
            target_directory: PathBuf::from("./compressed"),
            replace_original: false,
        }
    }
}

/// Compression configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Compression level, 10 to 90
    pub level: u8,
    /// Process `.jpg` and `.jpeg` files
    pub enable_jpeg: bool,
    /// Process `.png` files
    pub enable_png: bool,
    /// Process `.pdf` files
    pub enable_pdf: bool,
    /// JPEG quality knob, 10 to 50 in steps of 5
    pub jpeg_quality: u8,
    /// PNG quality knob, 10 to 50 in steps of 5
    pub png_quality: u8,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: CompressionLevel::DEFAULT,
            enable_jpeg: true,
            enable_png: true,
            enable_pdf: true,
            jpeg_quality: ImageQuality::DEFAULT,
            png_quality: ImageQuality::DEFAULT,
        }
    }
}

impl CompressionConfig {
    /// Check whether at least one file type is enabled
    pub fn any_enabled(&self) -> bool {
        self.enable_jpeg || self.enable_png || self.enable_pdf
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Number of concurrent workers
    pub parallel_workers: usize,
    /// Compression attempts per file
    pub retry_attempts: u32,
    /// Pause between failed attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Optional bound on a single compression call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_workers: WorkerCount::DEFAULT,
            retry_attempts: RetryPolicy::DEFAULT_ATTEMPTS,
            retry_delay_ms: RetryPolicy::DEFAULT_DELAY.as_millis() as u64,
            timeout_seconds: None,
        }
    }
}

/// Logging and progress display configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default log level when neither flags nor `RUST_LOG` set one
    pub log_level: String,
    /// Render a progress bar
    pub progress_bar: bool,
    /// Also write logs to `log_file`
    pub log_to_file: bool,
    /// Log file path
    pub log_file: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            progress_bar: true,
            log_to_file: false,
            log_file: PathBuf::from("batchpress.log"),
        }
    }
}

impl Config {
    /// Validate every section
    ///
    /// Any error here is fatal for a run.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Err(message) = CompressionLevel::new(self.compression.level) {
            return Err(ConfigError::invalid_value("compression.level", message));
        }

        if !self.compression.any_enabled() {
            return Err(ConfigError::validation(
                "At least one file type must be enabled",
            ));
        }

        if self.compression.enable_jpeg {
            if let Err(message) = ImageQuality::new(self.compression.jpeg_quality) {
                return Err(ConfigError::invalid_value("compression.jpeg_quality", message));
            }
        }

        if self.compression.enable_png {
            if let Err(message) = ImageQuality::new(self.compression.png_quality) {
                return Err(ConfigError::invalid_value("compression.png_quality", message));
            }
        }

        if self.processing.parallel_workers == 0 {
            return Err(ConfigError::validation(
                "Parallel workers must be greater than 0",
            ));
        }

        if self.processing.retry_attempts == 0 {
            return Err(ConfigError::validation(
                "Retry attempts must be greater than 0",
            ));
        }

        if self.processing.timeout_seconds == Some(0) {
            return Err(ConfigError::validation(
                "Timeout must be greater than 0 seconds when set",
            ));
        }

        if !LOG_LEVELS.contains(&self.output.log_level.as_str()) {
            return Err(ConfigError::validation(
                "Log level must be one of: trace, debug, info, warn, error",
            ));
        }

        if self.scanner.source_directory.as_os_str().is_empty() {
            return Err(ConfigError::missing_required("scanner.source_directory"));
        }

        if !self.scanner.replace_original && self.scanner.target_directory.as_os_str().is_empty()
        {
            return Err(ConfigError::missing_required("scanner.target_directory"));
        }

        Ok(())
    }

    /// Compression parameters for the configured level and qualities
    pub fn compression_params(&self) -> CompressionParams {
        let jpeg = ImageQuality::new(self.compression.jpeg_quality).unwrap_or_default();
        let png = ImageQuality::new(self.compression.png_quality).unwrap_or_default();
        CompressionParams::from_level(i64::from(self.compression.level))
            .with_image_qualities(jpeg, png)
    }

    /// Retry policy for a single file
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.processing.retry_attempts,
            Duration::from_millis(self.processing.retry_delay_ms),
        )
        .with_timeout(self.processing.timeout_seconds.map(Duration::from_secs))
    }

    /// Size of the worker pool
    pub fn worker_count(&self) -> WorkerCount {
        WorkerCount::new(self.processing.parallel_workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.processing.parallel_workers, 2);
        assert_eq!(config.processing.retry_attempts, 3);
        assert_eq!(config.processing.retry_delay_ms, 2000);
        assert_eq!(config.compression.level, 50);
        assert!(config.compression.enable_pdf);
    }

    #[rstest]
    #[case::level_low(|c: &mut Config| c.compression.level = 5, "compression.level")]
    #[case::level_high(|c: &mut Config| c.compression.level = 95, "compression.level")]
    #[case::jpeg_step(|c: &mut Config| c.compression.jpeg_quality = 33, "compression.jpeg_quality")]
    #[case::png_range(|c: &mut Config| c.compression.png_quality = 60, "compression.png_quality")]
    #[case::workers(|c: &mut Config| c.processing.parallel_workers = 0, "Parallel workers")]
    #[case::retries(|c: &mut Config| c.processing.retry_attempts = 0, "Retry attempts")]
    #[case::log_level(|c: &mut Config| c.output.log_level = "loud".into(), "Log level")]
    #[case::no_types(|c: &mut Config| {
        c.compression.enable_jpeg = false;
        c.compression.enable_png = false;
        c.compression.enable_pdf = false;
    }, "At least one file type")]
    #[case::no_target(
        |c: &mut Config| c.scanner.target_directory = PathBuf::new(),
        "target_directory"
    )]
    fn test_validation_rejects(#[case] mutate: fn(&mut Config), #[case] expected: &str) {
        let mut config = Config::default();
        mutate(&mut config);

        let err = config.validate().unwrap_err();
        assert!(
            err.to_string().contains(expected),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_disabled_format_quality_is_not_checked() {
        let mut config = Config::default();
        config.compression.enable_png = false;
        config.compression.png_quality = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_replace_mode_does_not_need_target() {
        let mut config = Config::default();
        config.scanner.replace_original = true;
        config.scanner.target_directory = PathBuf::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_derived_runtime_values() {
        let mut config = Config::default();
        config.compression.level = 75;
        config.compression.jpeg_quality = 45;
        config.processing.retry_delay_ms = 10;
        config.processing.timeout_seconds = Some(30);

        let params = config.compression_params();
        assert_eq!(params.level.get(), 75);
        assert_eq!(params.image_quality, 40);
        assert_eq!(params.jpeg_quality.get(), 45);

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_millis(10));
        assert_eq!(policy.timeout(), Some(Duration::from_secs(30)));
    }
}
