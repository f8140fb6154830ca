//! Replacement protocol
//!
//! Swaps a compressed temp file over its original in three steps:
//!
//! 1. rename `original` to `original.backup`
//! 2. rename `temp` to `original`, restoring the backup if this fails
//! 3. remove the backup
//!
//! The original path is missing only between steps 1 and 2. A failed cleanup
//! in step 3 is logged and otherwise ignored.

use batchpress_types::{Error, Result};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Suffix appended to the original while the swap is in progress
pub const BACKUP_SUFFIX: &str = ".backup";

/// Path of the backup kept for `original` during a swap
pub fn backup_path(original: &Path) -> PathBuf {
    let mut name = OsString::from(original.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Filesystem operations used by the swap
trait SwapOps {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

struct StdFs;

impl SwapOps for StdFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// State of one swap
struct ReplacementAttempt<'a> {
    original_path: &'a Path,
    temp_path: &'a Path,
    backup_path: PathBuf,
}

impl<'a> ReplacementAttempt<'a> {
    fn new(original_path: &'a Path, temp_path: &'a Path) -> Self {
        Self {
            original_path,
            temp_path,
            backup_path: backup_path(original_path),
        }
    }

    fn run(&self, ops: &impl SwapOps) -> Result<()> {
        if !self.temp_path.is_file() {
            return Err(Error::replacement(
                self.original_path,
                format!("compressed file {} does not exist", self.temp_path.display()),
            ));
        }

        ops.rename(self.original_path, &self.backup_path).map_err(|e| {
            Error::replacement(self.original_path, format!("failed to create backup: {}", e))
        })?;

        if let Err(e) = ops.rename(self.temp_path, self.original_path) {
            if let Err(rollback) = ops.rename(&self.backup_path, self.original_path) {
                error!(
                    "Failed to restore {} from {}: {}",
                    self.original_path.display(),
                    self.backup_path.display(),
                    rollback
                );
            }
            return Err(Error::replacement(
                self.original_path,
                format!("failed to move compressed file into place: {}", e),
            ));
        }

        if let Err(e) = ops.remove_file(&self.backup_path) {
            warn!(
                "Failed to remove backup {}: {}",
                self.backup_path.display(),
                e
            );
        }

        debug!("Replaced {}", self.original_path.display());
        Ok(())
    }
}

/// Replace `original` with `temp`
///
/// `temp` must exist. On error `original` still holds its previous content,
/// unless the rollback itself failed, which is logged.
pub fn replace_original(original: &Path, temp: &Path) -> Result<()> {
    ReplacementAttempt::new(original, temp).run(&StdFs)
}
