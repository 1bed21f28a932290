//! One 8-bit greyscale TIFF per frame.

use super::{ExportSummary, SequenceExporter};
use crate::acquire::FrameRing;
use crate::error::{CaptureError, CaptureResult};
use crate::grabber::FrameGeometry;
use image::{ExtendedColorType, ImageFormat};
use std::path::Path;

/// Writes `frame_000000.tif`, `frame_000001.tif`, ... into a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TiffSequenceExporter;

impl SequenceExporter for TiffSequenceExporter {
    fn artifact_name(&self, stem: &str) -> String {
        stem.to_string()
    }

    fn export(
        &self,
        ring: &FrameRing,
        geometry: &FrameGeometry,
        path: &Path,
    ) -> CaptureResult<ExportSummary> {
        if geometry.bytes_per_pixel != 1 {
            return Err(CaptureError::Export(format!(
                "TIFF export needs 8-bit frames, got {} bytes per pixel",
                geometry.bytes_per_pixel
            )));
        }
        let frame_bytes = geometry.frame_bytes()?;

        std::fs::create_dir_all(path)?;
        tracing::info!(path = %path.display(), frames = ring.len(), "Writing TIFF sequence");

        let mut bytes = 0u64;
        for frame in ring.frames() {
            let data = frame.pixel_data();
            if data.len() != frame_bytes {
                return Err(CaptureError::Export(format!(
                    "frame {} holds {} bytes, expected {frame_bytes}",
                    frame.frame_number,
                    data.len()
                )));
            }

            let file = path.join(format!("frame_{:06}.tif", frame.frame_number));
            image::save_buffer_with_format(
                &file,
                data,
                geometry.width,
                geometry.height,
                ExtendedColorType::L8,
                ImageFormat::Tiff,
            )
            .map_err(|e| CaptureError::Export(format!("{}: {e}", file.display())))?;
            bytes += std::fs::metadata(&file)?.len();
        }

        Ok(ExportSummary {
            path: path.to_path_buf(),
            frames: ring.len(),
            bytes,
        })
    }
}
