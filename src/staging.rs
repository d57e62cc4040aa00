//! Scoped on-disk staging of uploaded bytes.
//!
//! Conversion capabilities need a filesystem path, but uploads arrive as
//! bytes. [`stage`] writes them to a uniquely named temp file whose
//! extension matches the declared one (some converters sniff it), and the
//! returned [`StagedFile`] owns that file:
//!
//! * [`StagedFile::release`] unlinks it and may be called any number of times.
//! * Dropping a `StagedFile` releases it too, so an error, a panic or a
//!   cancelled request future can never leave the file behind.
//!
//! Cleanup failures are logged and swallowed: they must never replace the
//! outcome of the conversion itself.

use crate::error::DocToMdError;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};

/// An uploaded file staged on disk for exactly one conversion.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    extension: String,
    temp: Option<TempPath>,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Whether the file has not been released yet.
    pub fn is_live(&self) -> bool {
        self.temp.is_some()
    }

    /// Unlink the staged file. Idempotent.
    pub fn release(&mut self) {
        let Some(temp) = self.temp.take() else {
            return;
        };
        match temp.close() {
            Ok(()) => debug!("Released staged file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Staged file {} already gone", self.path.display())
            }
            Err(e) => warn!(
                "Failed to remove staged file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        self.release();
    }
}

/// Write `bytes` to a fresh temp file ending in `.{extension}`.
///
/// `dir` selects the staging directory; `None` uses the OS temp dir.
pub async fn stage(
    bytes: &[u8],
    extension: &str,
    dir: Option<&Path>,
) -> Result<StagedFile, DocToMdError> {
    let suffix = format!(".{extension}");
    let dir = dir.map(Path::to_path_buf);

    let temp = tokio::task::spawn_blocking(move || {
        let mut builder = tempfile::Builder::new();
        builder.prefix("doctomd-").suffix(&suffix);
        match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    })
    .await
    .map_err(|e| DocToMdError::Internal(format!("Staging task panicked: {e}")))?
    .map_err(|e| DocToMdError::io("Failed to create staging file", e))?
    .into_temp_path();

    let staged = StagedFile {
        path: temp.to_path_buf(),
        extension: extension.to_string(),
        temp: Some(temp),
    };

    // On a failed write `staged` is dropped here and the empty file removed.
    tokio::fs::write(staged.path(), bytes)
        .await
        .map_err(|e| DocToMdError::io("Failed to write staging file", e))?;

    debug!(
        "Staged {} bytes at {}",
        bytes.len(),
        staged.path().display()
    );
    Ok(staged)
}
