//! Unified test utilities for batchpress integration tests
//!
//! This module provides the fixtures used across the integration tests so
//! every scenario builds its source tree, compressor and sink the same way.

use async_trait::async_trait;
use batchpress_compression::CompressorRegistry;
use batchpress_config::Config;
use batchpress_engine::CancellationToken;
use batchpress_types::{
    CompressionOutput, CompressionParams, Compressor, Error, ProgressSink, Result, RunSnapshot,
};
use image::{DynamicImage, Rgb, RgbImage};
use lopdf::{dictionary, Document, Object, Stream};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Test data generation patterns
#[derive(Debug, Clone, Copy)]
pub enum TestDataPattern {
    /// All zeros
    Zeros,
    /// Structured bytes similar to actual files
    Realistic,
}

/// Generate test data with specified pattern
pub fn generate_test_data(size: usize, pattern: TestDataPattern) -> Vec<u8> {
    match pattern {
        TestDataPattern::Zeros => vec![0u8; size],
        TestDataPattern::Realistic => (0..size).map(|i| ((i * 7 + 13) % 256) as u8).collect(),
    }
}

/// Temporary source tree with a sibling output directory
pub struct TestTree {
    dir: TempDir,
}

impl TestTree {
    /// Create an empty tree; the source directory exists, the target does not
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir(dir.path().join("input")).expect("Failed to create source dir");
        Self { dir }
    }

    /// Root of the temporary directory
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Source directory
    pub fn source(&self) -> PathBuf {
        self.dir.path().join("input")
    }

    /// Target directory
    pub fn target(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    /// Write `size` bytes to `relative` under the source directory
    pub fn write(&self, relative: &str, size: usize) -> PathBuf {
        let path = self.source().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, generate_test_data(size, TestDataPattern::Realistic))
            .expect("Failed to write test file");
        path
    }

    /// Configuration pointing at this tree, without retry delays
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.scanner.source_directory = self.source();
        config.scanner.target_directory = self.target();
        config.processing.retry_delay_ms = 0;
        config
    }
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Write a noisy RGB JPEG of `side` x `side` pixels
pub fn write_noisy_jpeg(path: &Path, side: u32) {
    noisy_image(side)
        .save_with_format(path, image::ImageFormat::Jpeg)
        .expect("Failed to write JPEG fixture");
}

/// Write a noisy RGB PNG of `side` x `side` pixels
pub fn write_noisy_png(path: &Path, side: u32) {
    noisy_image(side)
        .save_with_format(path, image::ImageFormat::Png)
        .expect("Failed to write PNG fixture");
}

/// Write a one-page PDF with `lines` lines of uncompressed text and a document title
pub fn write_text_pdf(path: &Path, lines: usize) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let text = b"BT /F1 11 Tf 72 720 Td (line of report text) Tj ET\n".repeat(lines);
    let content_id = doc.add_object(Stream::new(dictionary! {}, text));
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal("Fixture"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.save(path).expect("Failed to write PDF fixture");
}

fn noisy_image(side: u32) -> DynamicImage {
    let img = RgbImage::from_fn(side, side, |x, y| {
        let seed = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503);
        Rgb([seed as u8, (seed >> 8) as u8, (seed >> 16) as u8])
    });
    DynamicImage::ImageRgb8(img)
}

/// One scripted compressor attempt
#[derive(Debug, Clone)]
pub enum Step {
    /// Write an output of this many bytes
    Output(u64),
    /// Write an output of half the input size
    Halve,
    /// Fail with a compression error
    Fail(String),
    /// Sleep this long, then write half the input size
    Stall(Duration),
    /// Panic with this message
    Panic(String),
}

impl Step {
    /// Shorthand for [`Step::Fail`]
    pub fn fail(message: &str) -> Self {
        Self::Fail(message.to_string())
    }
}

/// Compressor following a per-file script
///
/// Attempt `n` of a file runs step `n` of its script; the last step repeats.
/// Files without a script are halved.
pub struct MockCompressor {
    extensions: Vec<&'static str>,
    scripts: HashMap<String, Vec<Step>>,
    latency: Duration,
    cancel_on_first_call: Option<CancellationToken>,
    calls: Mutex<HashMap<String, usize>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockCompressor {
    /// Compressor for `.dat` files
    pub fn new() -> Self {
        Self {
            extensions: vec!["dat"],
            scripts: HashMap::new(),
            latency: Duration::ZERO,
            cancel_on_first_call: None,
            calls: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Script the attempts for the file named `file_name`
    pub fn script(mut self, file_name: &str, steps: Vec<Step>) -> Self {
        self.scripts.insert(file_name.to_string(), steps);
        self
    }

    /// Sleep this long in every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Cancel `token` during the first call
    pub fn cancel_on_first_call(mut self, token: CancellationToken) -> Self {
        self.cancel_on_first_call = Some(token);
        self
    }

    /// Calls made for the file named `file_name`
    pub fn calls(&self, file_name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(file_name)
            .copied()
            .unwrap_or(0)
    }

    /// Calls made for all files
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Highest number of calls that ran at the same time
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Registry holding only this compressor
    pub fn registry(self: &Arc<Self>) -> CompressorRegistry {
        CompressorRegistry::new().with(Arc::clone(self) as Arc<dyn Compressor>)
    }

    fn next_step(&self, file_name: &str) -> Step {
        let mut calls = self.calls.lock().unwrap();
        let attempt = calls.entry(file_name.to_string()).or_insert(0);
        *attempt += 1;

        match self.scripts.get(file_name) {
            Some(steps) if !steps.is_empty() => steps[(*attempt - 1).min(steps.len() - 1)].clone(),
            _ => Step::Halve,
        }
    }

    async fn execute(&self, step: Step, input: &Path, output: &Path) -> Result<CompressionOutput> {
        let size = match step {
            Step::Output(size) => size,
            Step::Fail(message) => return Err(Error::compression(message)),
            Step::Halve => tokio::fs::metadata(input).await?.len() / 2,
            Step::Stall(duration) => {
                tokio::time::sleep(duration).await;
                tokio::fs::metadata(input).await?.len() / 2
            }
            Step::Panic(message) => panic!("{}", message),
        };
        tokio::fs::write(output, generate_test_data(size as usize, TestDataPattern::Zeros)).await?;
        Ok(CompressionOutput {
            compressed_size: size,
        })
    }
}

impl Default for MockCompressor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Compressor for MockCompressor {
    fn name(&self) -> &str {
        "mock"
    }

    fn extensions(&self) -> &[&'static str] {
        &self.extensions
    }

    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        _params: &CompressionParams,
    ) -> Result<CompressionOutput> {
        let file_name = input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let step = self.next_step(&file_name);

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some(token) = &self.cancel_on_first_call {
            token.cancel();
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let result = self.execute(step, input, output).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Progress sink keeping every snapshot
#[derive(Default)]
pub struct RecordingSink {
    snapshots: Mutex<Vec<RunSnapshot>>,
}

impl RecordingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots in publication order
    pub fn snapshots(&self) -> Vec<RunSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    /// Last published snapshot
    pub fn last(&self) -> Option<RunSnapshot> {
        self.snapshots.lock().unwrap().last().cloned()
    }
}

impl ProgressSink for RecordingSink {
    fn publish(&self, snapshot: RunSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot);
    }
}
