//! Configuration value types for batchpress
//!
//! Validated newtypes shared by the config layer, the engine and the
//! compressors. Range checks live here so that every consumer agrees on them.

use std::time::Duration;

/// Compression level in the range `10..=90`
///
/// Higher values trade quality for size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    /// Lowest accepted level
    pub const MIN: u8 = 10;
    /// Highest accepted level
    pub const MAX: u8 = 90;
    /// Default level
    pub const DEFAULT: u8 = 50;

    /// Create a new compression level with validation
    pub fn new(level: u8) -> Result<Self, String> {
        if level < Self::MIN {
            Err(format!(
                "Compression level {} is below minimum {}",
                level,
                Self::MIN
            ))
        } else if level > Self::MAX {
            Err(format!(
                "Compression level {} exceeds maximum {}",
                level,
                Self::MAX
            ))
        } else {
            Ok(Self(level))
        }
    }

    /// Create a level, pulling out-of-range values to the nearest bound
    pub fn clamped(level: i64) -> Self {
        Self(level.clamp(i64::from(Self::MIN), i64::from(Self::MAX)) as u8)
    }

    /// Get the compression level value
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Per-format image quality knob in the range `10..=50`, step 5
///
/// Larger values compress harder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageQuality(u8);

impl ImageQuality {
    /// Lowest accepted quality
    pub const MIN: u8 = 10;
    /// Highest accepted quality
    pub const MAX: u8 = 50;
    /// Granularity of accepted values
    pub const STEP: u8 = 5;
    /// Default quality
    pub const DEFAULT: u8 = 30;

    /// Create a new image quality with validation
    pub fn new(quality: u8) -> Result<Self, String> {
        if quality < Self::MIN || quality > Self::MAX {
            Err(format!(
                "Image quality {} must be between {} and {}",
                quality,
                Self::MIN,
                Self::MAX
            ))
        } else if quality % Self::STEP != 0 {
            Err(format!(
                "Image quality {} must be a multiple of {}",
                quality,
                Self::STEP
            ))
        } else {
            Ok(Self(quality))
        }
    }

    /// Get the quality value
    pub fn get(self) -> u8 {
        self.0
    }

    /// Position of this quality inside its range, from 0.0 to 1.0
    pub fn fraction(self) -> f64 {
        f64::from(self.0 - Self::MIN) / f64::from(Self::MAX - Self::MIN)
    }
}

impl Default for ImageQuality {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Number of concurrent workers, never below one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkerCount(usize);

impl WorkerCount {
    /// Minimum worker count
    pub const MIN: usize = 1;
    /// Default worker count
    pub const DEFAULT: usize = 2;

    /// Create a worker count, raising zero to one
    pub fn new(count: usize) -> Self {
        Self(count.max(Self::MIN))
    }

    /// Get the worker count value
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for WorkerCount {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Fixed-attempt retry policy for a single compression call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Default number of attempts
    pub const DEFAULT_ATTEMPTS: u32 = 3;
    /// Default pause between failed attempts
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

    /// Create a retry policy; zero attempts is treated as one
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            timeout: None,
        }
    }

    /// Bound every individual call by `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum number of calls to the compressor
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause between two failed attempts
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Optional bound on a single call
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATTEMPTS, Self::DEFAULT_DELAY)
    }
}

/// Feature switches derived from a compression level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompressionFlags {
    /// Recompress embedded images
    pub image_compression: bool,
    /// Drop duplicated objects
    pub remove_duplicates: bool,
    /// Recompress data streams
    pub compress_streams: bool,
    /// Strip metadata
    pub remove_metadata: bool,
    /// Strip annotations
    pub remove_annotations: bool,
    /// Strip attachments
    pub remove_attachments: bool,
}

/// Parameters handed to a compressor for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompressionParams {
    /// Overall level
    pub level: CompressionLevel,
    /// JPEG quality in percent for images embedded in documents
    pub image_quality: u8,
    /// Quality knob for JPEG files
    pub jpeg_quality: ImageQuality,
    /// Quality knob for PNG files
    pub png_quality: ImageQuality,
    /// Feature switches derived from the level
    pub flags: CompressionFlags,
}

impl CompressionParams {
    /// Derive parameters from a level preset
    ///
    /// The level is clamped to `10..=90` first. Image quality and flags are
    /// stepped in bands of twenty.
    pub fn from_level(level: i64) -> Self {
        let level = CompressionLevel::clamped(level);
        let mut flags = CompressionFlags {
            image_compression: true,
            remove_duplicates: true,
            compress_streams: true,
            ..CompressionFlags::default()
        };

        let image_quality = match level.get() {
            0..=20 => 90,
            21..=40 => {
                flags.remove_metadata = true;
                75
            }
            41..=60 => {
                flags.remove_metadata = true;
                flags.remove_annotations = true;
                60
            }
            61..=80 => {
                flags.remove_metadata = true;
                flags.remove_annotations = true;
                flags.remove_attachments = true;
                40
            }
            _ => {
                flags.remove_metadata = true;
                flags.remove_annotations = true;
                flags.remove_attachments = true;
                25
            }
        };

        Self {
            level,
            image_quality,
            jpeg_quality: ImageQuality::default(),
            png_quality: ImageQuality::default(),
            flags,
        }
    }

    /// Override the per-format image qualities
    pub fn with_image_qualities(mut self, jpeg: ImageQuality, png: ImageQuality) -> Self {
        self.jpeg_quality = jpeg;
        self.png_quality = png;
        self
    }
}

impl Default for CompressionParams {
    fn default() -> Self {
        Self::from_level(i64::from(CompressionLevel::DEFAULT))
    }
}
