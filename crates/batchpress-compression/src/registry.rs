//! Compressor registry
//!
//! Maps lowercase file extensions to compressors. Built once at startup; the
//! inventory filters by its extensions and workers dispatch through it.

use crate::{JpegCompressor, PdfCompressor, PngCompressor};
use batchpress_config::CompressionConfig;
use batchpress_types::Compressor;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Extension to compressor mapping
#[derive(Clone, Default)]
pub struct CompressorRegistry {
    by_extension: BTreeMap<String, Arc<dyn Compressor>>,
}

impl CompressorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry for the formats enabled in `config`
    pub fn from_config(config: &CompressionConfig) -> Self {
        let mut registry = Self::new();
        if config.enable_jpeg {
            registry.register(Arc::new(JpegCompressor::new()));
        }
        if config.enable_png {
            registry.register(Arc::new(PngCompressor::new()));
        }
        if config.enable_pdf {
            registry.register(Arc::new(PdfCompressor::new()));
        }
        registry
    }

    /// Register `compressor` for every extension it declares, replacing earlier entries
    pub fn register(&mut self, compressor: Arc<dyn Compressor>) -> &mut Self {
        for ext in compressor.extensions() {
            debug!("Registering {} compressor for .{}", compressor.name(), ext);
            self.by_extension
                .insert(ext.to_ascii_lowercase(), Arc::clone(&compressor));
        }
        self
    }

    /// Builder-style variant of [`register`](Self::register)
    pub fn with(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.register(compressor);
        self
    }

    /// Compressor for an extension, matched case-insensitively
    pub fn get(&self, extension: &str) -> Option<Arc<dyn Compressor>> {
        self.by_extension
            .get(&extension.to_ascii_lowercase())
            .cloned()
    }

    /// Compressor for a file, chosen by its extension
    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn Compressor>> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.get(ext))
    }

    /// Registered extensions in sorted order
    pub fn extensions(&self) -> Vec<String> {
        self.by_extension.keys().cloned().collect()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }
}

impl fmt::Debug for CompressorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.by_extension
                    .iter()
                    .map(|(ext, compressor)| (ext, compressor.name())),
            )
            .finish()
    }
}
