//! JSON metadata written next to each artifact.

use crate::acquire::{CaptureReport, FrameMeta, FrameRing};
use crate::error::{CaptureError, CaptureResult};
use crate::grabber::FrameGeometry;
use crate::session::CaptureParams;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Everything known about a session besides its pixels.
#[derive(Debug, Clone, Serialize)]
pub struct Sidecar<'a> {
    /// Artifact the sidecar describes
    pub artifact: &'a Path,
    /// When the sidecar was built
    pub exported_at: DateTime<Utc>,
    /// Session parameters
    pub params: &'a CaptureParams,
    /// Frame size
    pub geometry: &'a FrameGeometry,
    /// Acquisition outcome
    pub report: &'a CaptureReport,
    /// Metadata of every exported frame, in order
    pub frames: Vec<FrameMeta>,
}

impl<'a> Sidecar<'a> {
    /// Describe `ring`, exported to `artifact`, stamped with the current time.
    #[must_use]
    pub fn new(
        artifact: &'a Path,
        params: &'a CaptureParams,
        geometry: &'a FrameGeometry,
        report: &'a CaptureReport,
        ring: &FrameRing,
    ) -> Self {
        Self {
            artifact,
            exported_at: Utc::now(),
            params,
            geometry,
            report,
            frames: ring.frames().map(|f| f.meta()).collect(),
        }
    }
}

/// `<artifact>.json`
#[must_use]
pub fn sidecar_path(artifact: &Path) -> PathBuf {
    let mut name = OsString::from(artifact.as_os_str());
    name.push(".json");
    PathBuf::from(name)
}

/// Write the sidecar for `sidecar.artifact`, returning its path.
///
/// # Errors
///
/// Returns an error if the file cannot be created or serialized.
pub fn write_sidecar(sidecar: &Sidecar<'_>) -> CaptureResult<PathBuf> {
    let path = sidecar_path(sidecar.artifact);
    write_json(BufWriter::new(File::create(&path)?), sidecar)
        .map_err(|e| CaptureError::Export(format!("sidecar {}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), "Sidecar written");
    Ok(path)
}

/// Serialize and flush, so an error writing the buffered tail is reported.
fn write_json<W: Write>(mut writer: W, sidecar: &Sidecar<'_>) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut writer, sidecar)?;
    writer.flush()
}
