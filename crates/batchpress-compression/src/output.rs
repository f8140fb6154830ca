//! Shared output handling for compressors
//!
//! Encoded data goes to a uniquely named hidden `.part` file next to the
//! requested output. The part file is dropped (and deleted) unless the async
//! side of the compressor persists it, so an attempt abandoned by a timeout
//! never renames anything into place after its outcome was reported.
//! Re-encodes that save less than 5% are replaced by a copy of the input.

use batchpress_types::{Error, Result};
use image::DynamicImage;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Encoded output must be below this share of the input, in percent
pub const EFFECTIVE_THRESHOLD_PERCENT: u64 = 95;

/// A finished but not yet visible output file
#[derive(Debug)]
pub(crate) struct PendingOutput {
    part: NamedTempFile,
    size: u64,
}

impl PendingOutput {
    /// Size of the bytes that [`persist`](Self::persist) will publish
    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    /// Move the part file onto `output`, replacing whatever is there
    pub(crate) fn persist(self, output: &Path) -> Result<u64> {
        let size = self.size;
        self.part.persist(output).map_err(|e| {
            Error::compression(format!(
                "failed to move encoded output to {}: {}",
                output.display(),
                e.error
            ))
        })?;
        Ok(size)
    }
}

/// Decode an image, mapping decoder failures to compression errors
pub(crate) fn decode(input: &Path) -> Result<DynamicImage> {
    image::open(input)
        .map_err(|e| Error::compression(format!("failed to decode {}: {}", input.display(), e)))
}

/// Target dimensions after scaling, or `None` when scaling would not shrink both sides
pub(crate) fn scaled_dimensions(width: u32, height: u32, scale: f64) -> Option<(u32, u32)> {
    let scale = scale.min(1.0);
    let new_width = (f64::from(width) * scale) as u32;
    let new_height = (f64::from(height) * scale) as u32;

    (new_width > 0 && new_height > 0 && new_width < width && new_height < height)
        .then_some((new_width, new_height))
}

/// Fail with [`Error::Cancelled`] once the attempt has been abandoned
pub(crate) fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Part file next to `output`, carrying the permissions of `input`
fn part_file(input: &Path, output: &Path) -> io::Result<NamedTempFile> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let stem = output
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let part = tempfile::Builder::new()
        .prefix(&format!(".{}.", stem))
        .suffix(".part")
        .tempfile_in(dir)?;
    part.as_file()
        .set_permissions(fs::metadata(input)?.permissions())?;
    Ok(part)
}

/// Encode into a part file, or fall back to a copy of the original bytes
///
/// Nothing is written to `output` itself. Dropping the returned value
/// deletes the part file.
pub(crate) fn encode_smaller<F>(
    input: &Path,
    output: &Path,
    cancel: &CancellationToken,
    encode: F,
) -> Result<PendingOutput>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
{
    let original_size = fs::metadata(input)?.len();

    let mut part = part_file(input, output)?;
    {
        let mut writer = BufWriter::new(part.as_file_mut());
        encode(&mut writer)?;
        writer.flush()?;
    }
    ensure_live(cancel)?;
    let encoded_size = part.as_file().metadata()?.len();

    if encoded_size < original_size * EFFECTIVE_THRESHOLD_PERCENT / 100 {
        return Ok(PendingOutput {
            part,
            size: encoded_size,
        });
    }

    debug!(
        "Encoded {} is {} bytes against {} original, keeping original bytes",
        input.display(),
        encoded_size,
        original_size
    );
    drop(part);

    let mut copy = part_file(input, output)?;
    let copied =
        File::open(input).and_then(|mut source| io::copy(&mut source, copy.as_file_mut()));
    let size = copied.map_err(|e| {
        Error::compression(format!(
            "failed to copy {} next to {}: {}",
            input.display(),
            output.display(),
            e
        ))
    })?;
    ensure_live(cancel)?;

    Ok(PendingOutput { part: copy, size })
}

/// Run blocking codec work and publish its output
///
/// The work gets a token that is cancelled when this future is dropped, so a
/// timed-out attempt stops at its next checkpoint. Whatever it still produces
/// is discarded together with the join handle.
pub(crate) async fn run_blocking<F>(
    label: &str,
    input: &Path,
    output: &Path,
    work: F,
) -> Result<u64>
where
    F: FnOnce(&Path, &Path, &CancellationToken) -> Result<PendingOutput> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let abandon = cancel.clone().drop_guard();
    let input_path: PathBuf = input.to_path_buf();
    let output_path: PathBuf = output.to_path_buf();

    let pending = tokio::task::spawn_blocking(move || work(&input_path, &output_path, &cancel))
        .await
        .map_err(|e| Error::compression(format!("{} task failed: {}", label, e)))??;
    abandon.disarm();

    debug!("{} produced {} bytes for {}", label, pending.size(), output.display());
    pending.persist(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_scaled_dimensions() {
        assert_eq!(scaled_dimensions(1000, 800, 0.5), Some((500, 400)));
        assert_eq!(scaled_dimensions(1000, 800, 1.0), None);
        assert_eq!(scaled_dimensions(1000, 800, 1.3), None);
        assert_eq!(scaled_dimensions(1, 1, 0.5), None);
    }

    #[test]
    fn test_encode_smaller_keeps_smaller_output() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.bin");
        let output = dir.path().join("out.bin");
        fs::write(&input, vec![7u8; 1000]).unwrap();

        let pending = encode_smaller(&input, &output, &CancellationToken::new(), |w| {
            w.write_all(&[1u8; 100])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(pending.size(), 100);
        assert!(!output.exists());

        assert_eq!(pending.persist(&output).unwrap(), 100);
        assert_eq!(fs::read(&output).unwrap(), vec![1u8; 100]);
        assert_eq!(entries(dir.path()), vec!["in.bin", "out.bin"]);
    }

    #[test]
    fn test_encode_smaller_falls_back_to_original() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.bin");
        let output = dir.path().join("out.bin");
        fs::write(&input, vec![7u8; 1000]).unwrap();

        // 960 bytes is above the 950 byte threshold
        let pending = encode_smaller(&input, &output, &CancellationToken::new(), |w| {
            w.write_all(&[1u8; 960])?;
            Ok(())
        })
        .unwrap();

        assert_eq!(pending.persist(&output).unwrap(), 1000);
        assert_eq!(fs::read(&output).unwrap(), vec![7u8; 1000]);
        assert_eq!(entries(dir.path()), vec!["in.bin", "out.bin"]);
    }

    #[test]
    fn test_encode_smaller_cleans_up_on_encode_error() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.bin");
        let output = dir.path().join("out.bin");
        fs::write(&input, b"data").unwrap();

        let result = encode_smaller(&input, &output, &CancellationToken::new(), |_| {
            Err(Error::compression("encoder exploded"))
        });

        assert!(result.is_err());
        assert_eq!(entries(dir.path()), vec!["in.bin"]);
    }

    #[test]
    fn test_unpersisted_output_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.bin");
        let output = dir.path().join("out.bin");
        fs::write(&input, vec![7u8; 1000]).unwrap();

        let pending = encode_smaller(&input, &output, &CancellationToken::new(), |w| {
            w.write_all(&[1u8; 10])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(entries(dir.path()).len(), 2);

        drop(pending);
        assert_eq!(entries(dir.path()), vec!["in.bin"]);
    }

    #[test]
    fn test_cancelled_attempt_discards_encoded_bytes() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.bin");
        let output = dir.path().join("out.bin");
        fs::write(&input, vec![7u8; 1000]).unwrap();
        let cancel = CancellationToken::new();

        let result = encode_smaller(&input, &output, &cancel, |w| {
            cancel.cancel();
            w.write_all(&[1u8; 10])?;
            Ok(())
        });

        assert_eq!(result.unwrap_err(), Error::Cancelled);
        assert_eq!(entries(dir.path()), vec!["in.bin"]);
    }

    #[tokio::test]
    async fn test_run_blocking_publishes_output() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.bin");
        let output = dir.path().join("out.bin");
        fs::write(&input, vec![7u8; 1000]).unwrap();

        let size = run_blocking("test", &input, &output, |input, output, cancel| {
            encode_smaller(input, output, cancel, |w| {
                w.write_all(&[2u8; 50])?;
                Ok(())
            })
        })
        .await
        .unwrap();

        assert_eq!(size, 50);
        assert_eq!(entries(dir.path()), vec!["in.bin", "out.bin"]);
    }
}
