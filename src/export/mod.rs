//! Sequence export.
//!
//! After a session the frames in the ring are written to one artifact named
//! after the session parameters, optionally with a JSON sidecar next to it.

pub mod avi;
pub mod sidecar;
pub mod tiff;

pub use avi::AviExporter;
pub use sidecar::{sidecar_path, write_sidecar, Sidecar};
pub use tiff::TiffSequenceExporter;

use crate::acquire::FrameRing;
use crate::config::{ExportConfig, ExportFormat};
use crate::error::CaptureResult;
use crate::grabber::FrameGeometry;
use crate::session::{CaptureParams, Stimulus};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// What an exporter wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    /// Artifact path (file or directory)
    pub path: PathBuf,
    /// Frames written
    pub frames: usize,
    /// Bytes written
    pub bytes: u64,
}

/// Writes the frames of a ring to a named artifact.
pub trait SequenceExporter: Send + Sync {
    /// Artifact name for a session stem.
    fn artifact_name(&self, stem: &str) -> String;

    /// Check that `frames` frames of `geometry` can be written at all.
    ///
    /// Called before the capture starts, so a request the format cannot hold
    /// is refused instead of failing after the frames were recorded.
    ///
    /// # Errors
    ///
    /// [`CaptureError::TooManyFrames`](crate::CaptureError::TooManyFrames)
    /// when the format caps the frame count below `frames`, or an export
    /// error when the geometry is unsupported.
    fn check_capacity(&self, _frames: usize, _geometry: &FrameGeometry) -> CaptureResult<()> {
        Ok(())
    }

    /// Write every frame in `ring` to `path`.
    fn export(
        &self,
        ring: &FrameRing,
        geometry: &FrameGeometry,
        path: &Path,
    ) -> CaptureResult<ExportSummary>;
}

/// Exporter for the configured output format.
#[must_use]
pub fn exporter_for(config: &ExportConfig) -> Box<dyn SequenceExporter> {
    match config.format {
        ExportFormat::Avi => Box::new(AviExporter::new(config.playback_fps)),
        ExportFormat::Tiff => Box::new(TiffSequenceExporter),
    }
}

/// Artifact name without extension, built from the session parameters.
#[must_use]
pub fn output_stem(params: &CaptureParams, prefix: &str) -> String {
    match params.stimulus {
        Stimulus::Saved { signal } => format!(
            "{prefix}_S_{signal}_{}Hz_{:.6}DelayTime_{}FPS_{}PulseTime",
            params.freq, params.delay_time, params.fps, params.pulse_time
        ),
        Stimulus::Electrical {
            vert_ampl,
            horiz_ampl,
            phase_offset,
        } => format!(
            "{prefix}_E_{}Hz_{horiz_ampl}A_{vert_ampl}A_{phase_offset:03}DPhase_{:.6}DelayTime_{}FPS_{}PulseTime",
            params.freq, params.delay_time, params.fps, params.pulse_time
        ),
    }
}

/// AVI file name for a session.
#[must_use]
pub fn output_file_name(params: &CaptureParams, prefix: &str) -> String {
    format!("{}.avi", output_stem(params, prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_signal_file_name() {
        let params = CaptureParams {
            stimulus: Stimulus::Saved { signal: 4 },
            freq: 30,
            fps: 1000,
            num_images: 1500,
            pulse_time: 20,
            delay_time: 0.25,
        };
        assert_eq!(
            output_file_name(&params, "Mikrotron"),
            "Mikrotron_S_4_30Hz_0.250000DelayTime_1000FPS_20PulseTime.avi"
        );
    }

    #[test]
    fn test_electrical_file_name_orders_horizontal_first() {
        let params = CaptureParams {
            stimulus: Stimulus::Electrical {
                vert_ampl: 3,
                horiz_ampl: 5,
                phase_offset: 9,
            },
            freq: 12,
            fps: 500,
            num_images: 200,
            pulse_time: 15,
            delay_time: 1.5,
        };
        assert_eq!(
            output_file_name(&params, "Mikrotron"),
            "Mikrotron_E_12Hz_5A_3A_009DPhase_1.500000DelayTime_500FPS_15PulseTime.avi"
        );
    }

    #[test]
    fn test_exporter_for_format() {
        let mut config = ExportConfig::default();
        assert_eq!(exporter_for(&config).artifact_name("run"), "run.avi");
        config.format = ExportFormat::Tiff;
        assert_eq!(exporter_for(&config).artifact_name("run"), "run");
    }
}
