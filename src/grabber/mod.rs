//! Frame grabber boundary.
//!
//! The vendor SDK is reduced to the handful of capabilities the capture
//! pipeline needs and expressed as the [`FrameSource`] trait. A sequence
//! capture of `n` frames fills driver buffers `1..=n`; buffer `0` is never
//! written. [`FrameSource::captured_buffer`] reports the most recently
//! completed buffer, `0` meaning none yet.
//!
//! [`SimulatedGrabber`] implements the trait in software so the service runs
//! without hardware.

pub mod connection;
pub mod simulated;

pub use connection::{open_with_retry, GrabberGuard, RetryPolicy};
pub use simulated::{SimulatedGrabber, SimulatedGrabberBuilder};

use crate::error::{CaptureError, CaptureResult, SourceError};
use serde::{Deserialize, Serialize};

/// Maximum allowed frame payload in bytes (100 MiB).
pub const MAX_FRAME_BYTES: usize = 100 * 1024 * 1024;
/// Maximum supported width/height for frames.
pub const MAX_FRAME_DIMENSION: u32 = 65_536;

/// Index of a driver buffer. `0` means no buffer has completed yet.
pub type BufferIndex = u32;

/// Frame dimensions reported by the grabber when it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    /// Pixels per row
    pub width: u32,
    /// Rows per frame
    pub height: u32,
    /// Bytes per pixel (1 for 8-bit greyscale)
    pub bytes_per_pixel: u32,
}

impl FrameGeometry {
    /// 8-bit greyscale geometry.
    #[must_use]
    pub fn grey8(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel: 1,
        }
    }

    /// Validate the dimensions and return the size of one frame in bytes.
    ///
    /// # Errors
    ///
    /// Fails if a dimension exceeds [`MAX_FRAME_DIMENSION`], the size
    /// overflows, or one frame would exceed [`MAX_FRAME_BYTES`].
    pub fn frame_bytes(&self) -> CaptureResult<usize> {
        if self.width > MAX_FRAME_DIMENSION || self.height > MAX_FRAME_DIMENSION {
            return Err(CaptureError::FrameDimensionsTooLarge {
                width: self.width,
                height: self.height,
                max_dimension: MAX_FRAME_DIMENSION,
            });
        }

        let pixels = (self.width as usize)
            .checked_mul(self.height as usize)
            .ok_or(CaptureError::SizeOverflow {
                context: "frame pixel count",
            })?;

        let bytes = pixels
            .checked_mul(self.bytes_per_pixel as usize)
            .ok_or(CaptureError::SizeOverflow {
                context: "frame byte size",
            })?;

        if bytes > MAX_FRAME_BYTES {
            return Err(CaptureError::FrameTooLarge {
                bytes,
                max_bytes: MAX_FRAME_BYTES,
            });
        }

        Ok(bytes)
    }
}

/// Capabilities of a frame grabber driver.
///
/// Implementations are driven from a single blocking thread; they only need
/// to be `Send` so ownership can move onto that thread for the capture.
pub trait FrameSource: Send {
    /// Human-readable driver name for logs.
    fn name(&self) -> &str;

    /// Open the device and load its video format.
    fn open(&mut self) -> Result<FrameGeometry, SourceError>;

    /// Close the device. Closing an already closed source is a no-op.
    fn close(&mut self);

    /// Whether the device is currently open.
    fn is_open(&self) -> bool;

    /// Start a live sequence capture into buffers `1..=frames`.
    fn start_sequence(&mut self, frames: u32) -> Result<(), SourceError>;

    /// Most recently completed buffer (`0` = none yet).
    fn captured_buffer(&self) -> BufferIndex;

    /// Whether the device is still acquiring.
    fn is_live(&self) -> bool;

    /// Copy one completed buffer into `dst`, returning the bytes written.
    fn read_buffer(&self, index: BufferIndex, dst: &mut [u8]) -> Result<usize, SourceError>;

    /// Stop an acquisition in progress.
    fn abort(&mut self);

    /// Driver fault report for the last acquisition, if it recorded any.
    fn fault_report(&self) -> Option<String>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn open(&mut self) -> Result<FrameGeometry, SourceError> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn start_sequence(&mut self, frames: u32) -> Result<(), SourceError> {
        (**self).start_sequence(frames)
    }

    fn captured_buffer(&self) -> BufferIndex {
        (**self).captured_buffer()
    }

    fn is_live(&self) -> bool {
        (**self).is_live()
    }

    fn read_buffer(&self, index: BufferIndex, dst: &mut [u8]) -> Result<usize, SourceError> {
        (**self).read_buffer(index, dst)
    }

    fn abort(&mut self) {
        (**self).abort();
    }

    fn fault_report(&self) -> Option<String> {
        (**self).fault_report()
    }
}
