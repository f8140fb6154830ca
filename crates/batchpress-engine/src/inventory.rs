//! File inventory
//!
//! Depth-first listing of every file under a root whose extension is in a
//! given set. Stateless; unreadable entries are skipped with a warning.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extension-filtered directory listing
#[derive(Debug, Clone)]
pub struct FileInventory {
    extensions: Vec<String>,
}

impl FileInventory {
    /// Create an inventory matching `extensions`, compared case-insensitively
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Check if `path` has one of the accepted extensions
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// List matching files under `root`, sorted lexicographically
    ///
    /// An empty result is not an error here.
    pub fn scan(&self, root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };

            if entry.file_type().is_file() && self.matches(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        debug!("Inventory of {} found {} files", root.display(), files.len());
        files
    }
}
