//! PNG compressor

use crate::output::{
    decode, encode_smaller, ensure_live, run_blocking, scaled_dimensions, PendingOutput,
};
use async_trait::async_trait;
use batchpress_types::{
    CompressionOutput, CompressionParams, Compressor, Error, ImageQuality, Result,
};
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Images with both sides below this many pixels are never resized
pub const MIN_RESIZE_DIMENSION: u32 = 400;

/// Re-encodes PNG files with the strongest deflate setting, downscaling large ones
#[derive(Debug, Clone, Copy, Default)]
pub struct PngCompressor;

impl PngCompressor {
    /// Create a new PNG compressor
    pub fn new() -> Self {
        Self
    }

    /// Scale factor applied to both sides: 0.6 at quality 10, 0.9 at quality 50
    pub fn scale_factor(quality: ImageQuality) -> f64 {
        (0.6 + quality.fraction() * 0.3).min(1.0)
    }

    fn target_dimensions(width: u32, height: u32, quality: ImageQuality) -> Option<(u32, u32)> {
        if width < MIN_RESIZE_DIMENSION && height < MIN_RESIZE_DIMENSION {
            return None;
        }
        scaled_dimensions(width, height, Self::scale_factor(quality))
    }

    fn compress_blocking(
        input: &Path,
        output: &Path,
        quality: ImageQuality,
        cancel: &CancellationToken,
    ) -> Result<PendingOutput> {
        let img = decode(input)?;
        ensure_live(cancel)?;
        let img = match Self::target_dimensions(img.width(), img.height(), quality) {
            Some((width, height)) => {
                debug!("Resizing {} to {}x{}", input.display(), width, height);
                img.resize_exact(width, height, FilterType::Lanczos3)
            }
            None => img,
        };
        ensure_live(cancel)?;

        encode_smaller(input, output, cancel, |writer| {
            let encoder =
                PngEncoder::new_with_quality(writer, CompressionType::Best, PngFilter::Adaptive);
            img.write_with_encoder(encoder)
                .map_err(|e| Error::compression(format!("failed to encode PNG: {}", e)))
        })
    }
}

#[async_trait]
impl Compressor for PngCompressor {
    fn name(&self) -> &str {
        "png"
    }

    fn extensions(&self) -> &[&'static str] {
        &["png"]
    }

    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        params: &CompressionParams,
    ) -> Result<CompressionOutput> {
        let quality = params.png_quality;
        let compressed_size = run_blocking("PNG", input, output, move |input, output, cancel| {
            Self::compress_blocking(input, output, quality, cancel)
        })
        .await?;

        Ok(CompressionOutput { compressed_size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageEncoder, Rgba, RgbaImage};
    use std::fs;
    use tempfile::TempDir;

    fn write_png(path: &Path, img: &RgbaImage, compression: CompressionType) {
        let file = fs::File::create(path).unwrap();
        PngEncoder::new_with_quality(file, compression, PngFilter::Adaptive)
            .write_image(
                img.as_raw(),
                img.width(),
                img.height(),
                image::ExtendedColorType::Rgba8,
            )
            .unwrap();
    }

    #[test]
    fn test_small_images_are_not_resized() {
        let q = ImageQuality::new(10).unwrap();
        assert_eq!(PngCompressor::target_dimensions(399, 399, q), None);
        assert_eq!(PngCompressor::target_dimensions(1000, 500, q), Some((600, 300)));
        assert_eq!(PngCompressor::target_dimensions(399, 1000, q), Some((239, 600)));
    }

    #[tokio::test]
    async fn test_already_optimal_png_is_copied() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("icon.png");
        let output = dir.path().join("icon.out.png");
        let img = RgbaImage::from_pixel(16, 16, Rgba([10, 20, 30, 255]));
        write_png(&input, &img, CompressionType::Best);

        let result = PngCompressor::new()
            .compress(&input, &output, &CompressionParams::default())
            .await
            .unwrap();

        assert_eq!(fs::read(&output).unwrap(), fs::read(&input).unwrap());
        assert_eq!(result.compressed_size, fs::metadata(&input).unwrap().len());
    }

    #[tokio::test]
    async fn test_large_png_is_downscaled() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("chart.png");
        let output = dir.path().join("chart.out.png");
        let img = RgbaImage::from_fn(500, 500, |x, y| {
            let v = (x.wrapping_mul(7919) ^ y.wrapping_mul(104_729)).wrapping_mul(2_654_435_761);
            Rgba([(v >> 8) as u8, (v >> 16) as u8, (v >> 24) as u8, 255])
        });
        write_png(&input, &img, CompressionType::Fast);
        let original = fs::metadata(&input).unwrap().len();

        let mut params = CompressionParams::default();
        params.png_quality = ImageQuality::new(10).unwrap();
        let result = PngCompressor::new()
            .compress(&input, &output, &params)
            .await
            .unwrap();

        assert!(result.compressed_size < original);
        assert_eq!(image::open(&output).unwrap().width(), 300);
    }
}
