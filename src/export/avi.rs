//! Uncompressed 8-bit greyscale AVI writer.
//!
//! Layout (RIFF, all integers little-endian):
//!
//! ```text
//! RIFF 'AVI '
//!   LIST 'hdrl'
//!     avih            main header
//!     LIST 'strl'
//!       strh          video stream header, handler Y800
//!       strf          BITMAPINFOHEADER, compression Y800, 8 bpp
//!   LIST 'movi'
//!     00db * n        one raw frame per chunk, top-down rows
//!   idx1              one keyframe entry per frame
//! ```
//!
//! Every chunk size is known before writing, so the file is written front to
//! back in one pass. The whole file must fit the 32-bit RIFF size field.

use super::{ExportSummary, SequenceExporter};
use crate::acquire::FrameRing;
use crate::error::{CaptureError, CaptureResult};
use crate::grabber::FrameGeometry;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;
const AVIH_SIZE: u32 = 56;
const STRH_SIZE: u32 = 56;
const STRF_SIZE: u32 = 40;
const IDX1_ENTRY_SIZE: u32 = 16;
const RATE_SCALE: u32 = 1000;
const STRL_SIZE: u32 = 4 + (8 + STRH_SIZE) + (8 + STRF_SIZE);
const HDRL_SIZE: u32 = 4 + (8 + AVIH_SIZE) + (8 + STRL_SIZE);

/// Writes the ring as an uncompressed AVI at a fixed playback rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AviExporter {
    playback_fps: f64,
}

impl AviExporter {
    /// Exporter writing `playback_fps` into the stream header.
    #[must_use]
    pub fn new(playback_fps: f64) -> Self {
        Self { playback_fps }
    }

    fn check_geometry(geometry: &FrameGeometry) -> CaptureResult<()> {
        if geometry.bytes_per_pixel != 1 {
            return Err(CaptureError::Export(format!(
                "AVI export needs 8-bit frames, got {} bytes per pixel",
                geometry.bytes_per_pixel
            )));
        }
        if geometry.width > u32::from(u16::MAX) || geometry.height > u32::from(u16::MAX) {
            return Err(CaptureError::Export(format!(
                "frame {}x{} is too large for an AVI stream header",
                geometry.width, geometry.height
            )));
        }
        Ok(())
    }
}

/// Chunk sizes for a file of `frames` frames of `frame_bytes` bytes.
struct Layout {
    frame_chunk: u32,
    padded_chunk: u32,
    strl: u32,
    hdrl: u32,
    movi: u32,
    idx1: u32,
    riff: u32,
}

fn too_large() -> CaptureError {
    CaptureError::Export("sequence does not fit in a 4 GiB AVI file".to_string())
}

impl Layout {
    fn new(frames: usize, frame_bytes: usize) -> CaptureResult<Self> {
        let frames = u32::try_from(frames).map_err(|_| too_large())?;
        let frame_chunk = u32::try_from(frame_bytes).map_err(|_| too_large())?;
        let padded_chunk = frame_chunk + (frame_chunk & 1);

        let movi = (8 + padded_chunk)
            .checked_mul(frames)
            .and_then(|data| data.checked_add(4))
            .ok_or_else(too_large)?;
        let idx1 = IDX1_ENTRY_SIZE.checked_mul(frames).ok_or_else(too_large)?;
        let riff = [8 + HDRL_SIZE, 8 + movi, 8 + idx1]
            .into_iter()
            .try_fold(4u32, u32::checked_add)
            .ok_or_else(too_large)?;

        Ok(Self {
            frame_chunk,
            padded_chunk,
            strl: STRL_SIZE,
            hdrl: HDRL_SIZE,
            movi,
            idx1,
            riff,
        })
    }

    /// Largest frame count whose file still fits the 32-bit RIFF size.
    fn max_frames(frame_bytes: usize) -> usize {
        let Ok(frame_chunk) = u64::try_from(frame_bytes) else {
            return 0;
        };
        let padded_chunk = frame_chunk + (frame_chunk & 1);
        // 'AVI ', the hdrl list, the movi list header and type, the idx1 header
        let fixed = u64::from(4 + (8 + HDRL_SIZE) + (8 + 4) + 8);
        let per_frame = 8 + padded_chunk + u64::from(IDX1_ENTRY_SIZE);
        let frames = (u64::from(u32::MAX) - fixed) / per_frame;
        usize::try_from(frames).unwrap_or(usize::MAX)
    }
}

fn chunk_header(out: &mut impl Write, id: &[u8; 4], size: u32) -> std::io::Result<()> {
    out.write_all(id)?;
    out.write_all(&size.to_le_bytes())
}

fn list_header(out: &mut impl Write, size: u32, kind: &[u8; 4]) -> std::io::Result<()> {
    chunk_header(out, b"LIST", size)?;
    out.write_all(kind)
}

fn u32s(out: &mut impl Write, values: &[u32]) -> std::io::Result<()> {
    for value in values {
        out.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

impl AviExporter {
    fn write(
        &self,
        out: &mut impl Write,
        ring: &FrameRing,
        geometry: &FrameGeometry,
        layout: &Layout,
    ) -> std::io::Result<()> {
        let frames = ring.len() as u32;
        let rate = (self.playback_fps * f64::from(RATE_SCALE)).round() as u32;
        let usec_per_frame = (1_000_000.0 / self.playback_fps).round() as u32;
        let max_bytes_per_sec = (f64::from(layout.frame_chunk) * self.playback_fps).ceil() as u32;

        chunk_header(out, b"RIFF", layout.riff)?;
        out.write_all(b"AVI ")?;

        list_header(out, layout.hdrl, b"hdrl")?;
        chunk_header(out, b"avih", AVIH_SIZE)?;
        u32s(
            out,
            &[
                usec_per_frame,
                max_bytes_per_sec,
                0, // padding granularity
                AVIF_HASINDEX,
                frames,
                0, // initial frames
                1, // streams
                layout.frame_chunk,
                geometry.width,
                geometry.height,
                0,
                0,
                0,
                0,
            ],
        )?;

        list_header(out, layout.strl, b"strl")?;
        chunk_header(out, b"strh", STRH_SIZE)?;
        out.write_all(b"vids")?;
        out.write_all(b"Y800")?;
        u32s(out, &[0])?; // flags
        out.write_all(&0u16.to_le_bytes())?; // priority
        out.write_all(&0u16.to_le_bytes())?; // language
        u32s(
            out,
            &[
                0, // initial frames
                RATE_SCALE,
                rate,
                0, // start
                frames,
                layout.frame_chunk,
                u32::MAX, // quality: driver default
                0,        // sample size
            ],
        )?;
        for edge in [0u16, 0, geometry.width as u16, geometry.height as u16] {
            out.write_all(&edge.to_le_bytes())?;
        }

        chunk_header(out, b"strf", STRF_SIZE)?;
        u32s(out, &[STRF_SIZE, geometry.width, geometry.height])?;
        out.write_all(&1u16.to_le_bytes())?; // planes
        out.write_all(&8u16.to_le_bytes())?; // bit count
        out.write_all(b"Y800")?;
        u32s(out, &[layout.frame_chunk, 0, 0, 0, 0])?;

        list_header(out, layout.movi, b"movi")?;
        let blank = vec![0u8; layout.frame_chunk as usize];
        for frame in ring.frames() {
            chunk_header(out, b"00db", layout.frame_chunk)?;
            let data = frame.pixel_data();
            // a short frame is padded with black so every chunk has the same size
            let used = data.len().min(blank.len());
            out.write_all(&data[..used])?;
            out.write_all(&blank[used..])?;
            if layout.padded_chunk != layout.frame_chunk {
                out.write_all(&[0])?;
            }
        }

        chunk_header(out, b"idx1", layout.idx1)?;
        // offsets are relative to the 'movi' list type field
        let mut offset = 4u32;
        for _ in 0..frames {
            out.write_all(b"00db")?;
            u32s(out, &[AVIIF_KEYFRAME, offset, layout.frame_chunk])?;
            offset += 8 + layout.padded_chunk;
        }

        out.flush()
    }
}

impl SequenceExporter for AviExporter {
    fn artifact_name(&self, stem: &str) -> String {
        format!("{stem}.avi")
    }

    fn check_capacity(&self, frames: usize, geometry: &FrameGeometry) -> CaptureResult<()> {
        Self::check_geometry(geometry)?;
        let max = Layout::max_frames(geometry.frame_bytes()?);
        if frames > max {
            return Err(CaptureError::TooManyFrames {
                requested: frames,
                max,
            });
        }
        Ok(())
    }

    fn export(
        &self,
        ring: &FrameRing,
        geometry: &FrameGeometry,
        path: &Path,
    ) -> CaptureResult<ExportSummary> {
        Self::check_geometry(geometry)?;
        if !(self.playback_fps.is_finite() && self.playback_fps > 0.0) {
            return Err(CaptureError::Export(format!(
                "invalid playback rate {}",
                self.playback_fps
            )));
        }

        let layout = Layout::new(ring.len(), geometry.frame_bytes()?)?;

        tracing::info!(
            path = %path.display(),
            frames = ring.len(),
            fps = self.playback_fps,
            "Writing AVI"
        );
        let mut out = BufWriter::new(File::create(path)?);
        self.write(&mut out, ring, geometry, &layout)?;

        Ok(ExportSummary {
            path: path.to_path_buf(),
            frames: ring.len(),
            bytes: u64::from(layout.riff) + 8,
        })
    }
}
