//! JPEG compressor
//!
//! Downscales and re-encodes JPEG images. The quality knob (10..=50) drives
//! both the scale factor and the encoder quality.

use crate::output::{
    decode, encode_smaller, ensure_live, run_blocking, scaled_dimensions, PendingOutput,
};
use async_trait::async_trait;
use batchpress_types::{
    CompressionOutput, CompressionParams, Compressor, Error, ImageQuality, Result,
};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Re-encodes JPEG files at a lower resolution and quality
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCompressor;

impl JpegCompressor {
    /// Create a new JPEG compressor
    pub fn new() -> Self {
        Self
    }

    /// Scale factor applied to both sides: 0.5 at quality 10, 0.9 at quality 50
    pub fn scale_factor(quality: ImageQuality) -> f64 {
        (0.5 + quality.fraction() * 0.4).min(1.0)
    }

    /// Encoder quality: 20 at quality 10, 75 at quality 50
    pub fn encoder_quality(quality: ImageQuality) -> u8 {
        let value = 20.0 + quality.fraction() * 55.0;
        (value as u8).clamp(20, 75)
    }

    fn compress_blocking(
        input: &Path,
        output: &Path,
        quality: ImageQuality,
        cancel: &CancellationToken,
    ) -> Result<PendingOutput> {
        let img = decode(input)?;
        ensure_live(cancel)?;
        let img = match scaled_dimensions(img.width(), img.height(), Self::scale_factor(quality)) {
            Some((width, height)) => {
                debug!(
                    "Resizing {} from {}x{} to {}x{}",
                    input.display(),
                    img.width(),
                    img.height(),
                    width,
                    height
                );
                img.resize_exact(width, height, FilterType::Lanczos3)
            }
            None => img,
        };
        ensure_live(cancel)?;
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        let encoder_quality = Self::encoder_quality(quality);

        encode_smaller(input, output, cancel, |writer| {
            let encoder = JpegEncoder::new_with_quality(writer, encoder_quality);
            rgb.write_with_encoder(encoder)
                .map_err(|e| Error::compression(format!("failed to encode JPEG: {}", e)))
        })
    }
}

#[async_trait]
impl Compressor for JpegCompressor {
    fn name(&self) -> &str {
        "jpeg"
    }

    fn extensions(&self) -> &[&'static str] {
        &["jpg", "jpeg"]
    }

    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        params: &CompressionParams,
    ) -> Result<CompressionOutput> {
        let quality = params.jpeg_quality;
        let compressed_size = run_blocking("JPEG", input, output, move |input, output, cancel| {
            Self::compress_blocking(input, output, quality, cancel)
        })
        .await?;

        Ok(CompressionOutput { compressed_size })
    }
}
