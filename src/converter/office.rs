//! DOCX / PPTX → PDF through an external office suite.
//!
//! Runs `soffice --headless --convert-to pdf --outdir <tmp> <file>` and hands
//! back the produced PDF, which then takes the regular PDF path. Each run
//! gets a private user profile inside its temp dir: concurrent `soffice`
//! processes sharing one profile fail silently.

use crate::error::CapabilityError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

/// A converted PDF; the file lives as long as this value.
#[derive(Debug)]
pub struct OfficePdf {
    path: PathBuf,
    _dir: TempDir,
}

impl OfficePdf {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Convert an office document to PDF with `executable`.
///
/// A missing executable is [`FailureKind::OcrUnavailable`]; a non-zero exit,
/// a timeout or a missing output file are permanent failures.
///
/// [`FailureKind::OcrUnavailable`]: crate::error::FailureKind::OcrUnavailable
pub async fn convert_to_pdf(
    executable: &str,
    input: &Path,
    timeout: Duration,
) -> Result<OfficePdf, CapabilityError> {
    let dir = tempfile::Builder::new()
        .prefix("doctomd-office-")
        .tempdir()
        .map_err(|e| CapabilityError::permanent(format!("Failed to create office work dir: {e}")))?;
    let profile = dir.path().join("profile");
    let outdir = dir.path().join("out");

    let mut cmd = Command::new(executable);
    cmd.arg(format!("-env:UserInstallation=file://{}", profile.display()))
        .args(["--headless", "--norestore", "--convert-to", "pdf", "--outdir"])
        .arg(&outdir)
        .arg(input)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("office run {} {}", executable, input.display());
    let start = Instant::now();
    let child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CapabilityError::ocr_unavailable(format!(
                "Office converter '{executable}' not found; install LibreOffice to convert DOCX/PPTX"
            ))
        } else {
            CapabilityError::permanent(format!("Failed to start office converter: {e}"))
        }
    })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| {
            CapabilityError::permanent(format!(
                "Office conversion timed out after {}s",
                timeout.as_secs()
            ))
        })?
        .map_err(|e| CapabilityError::permanent(format!("Office converter failed: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("office converter exited with {}: {}", output.status, stderr.trim());
        return Err(CapabilityError::permanent(format!(
            "Office conversion failed ({}): {}",
            output.status,
            stderr.trim()
        )));
    }

    let path = find_pdf(&outdir, input).await?;
    debug!(
        "office conversion done in {:?} → {}",
        start.elapsed(),
        path.display()
    );
    Ok(OfficePdf { path, _dir: dir })
}

/// `soffice` names the output after the input stem; fall back to the first
/// PDF in the directory when it does not.
async fn find_pdf(outdir: &Path, input: &Path) -> Result<PathBuf, CapabilityError> {
    if let Some(stem) = input.file_stem() {
        let expected = outdir.join(stem).with_extension("pdf");
        if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
            return Ok(expected);
        }
    }

    let missing = || CapabilityError::permanent("Office converter produced no PDF");
    let mut entries = tokio::fs::read_dir(outdir).await.map_err(|_| missing())?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("pdf")) {
            return Ok(path);
        }
    }
    Err(missing())
}
