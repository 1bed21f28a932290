//! Frame slot stored in the capture ring.
//!
//! Slots are allocated once, before the sequence starts, and filled in place
//! while buffers complete. Nothing in the copy path allocates.

use serde::Serialize;

/// One frame copied out of a driver buffer.
#[derive(Debug)]
pub struct FrameData {
    /// Pre-allocated pixel buffer. `actual_len` indicates valid data.
    pub pixels: Vec<u8>,

    /// Bytes written this frame.
    pub actual_len: usize,

    /// Position in the session, starting at 0.
    pub frame_number: u64,

    /// Driver buffer the frame was read from (1-based).
    pub buffer_index: u32,

    /// Copy timestamp (nanoseconds since epoch).
    pub timestamp_ns: u64,
}

impl FrameData {
    /// Create a slot with a zero-filled buffer of `byte_capacity` bytes.
    #[must_use]
    pub fn with_capacity(byte_capacity: usize) -> Self {
        Self {
            pixels: vec![0u8; byte_capacity],
            actual_len: 0,
            frame_number: 0,
            buffer_index: 0,
            timestamp_ns: 0,
        }
    }

    /// Reset metadata for reuse. Pixel data is left in place and overwritten
    /// by the next copy.
    pub fn reset(&mut self) {
        self.actual_len = 0;
        self.frame_number = 0;
        self.buffer_index = 0;
        self.timestamp_ns = 0;
    }

    /// Valid pixel data.
    #[inline]
    #[must_use]
    pub fn pixel_data(&self) -> &[u8] {
        &self.pixels[..self.actual_len]
    }

    /// Allocated pixel bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pixels.len()
    }

    /// Per-frame metadata without the pixels.
    #[must_use]
    pub fn meta(&self) -> FrameMeta {
        FrameMeta {
            frame_number: self.frame_number,
            buffer_index: self.buffer_index,
            timestamp_ns: self.timestamp_ns,
        }
    }
}

/// Frame metadata written to the export sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameMeta {
    /// Position in the captured sequence, from 0
    pub frame_number: u64,
    /// Driver buffer the frame was copied from
    pub buffer_index: u32,
    /// Copy time, nanoseconds since the Unix epoch
    pub timestamp_ns: u64,
}
