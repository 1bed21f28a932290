//! Fixed-size ring of pre-allocated frame slots.

use super::frame_data::FrameData;
use crate::error::{CaptureError, CaptureResult, SourceError};

/// Frames captured during one session.
///
/// The number of stored frames never exceeds the number of slots allocated
/// up front. A push into a full ring fails instead of growing it.
#[derive(Debug)]
pub struct FrameRing {
    slots: Vec<FrameData>,
    frame_bytes: usize,
    len: usize,
}

impl FrameRing {
    /// Allocate `slots` frames of `frame_bytes` each.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::SizeOverflow`] if the total size does not fit in memory.
    pub fn new(slots: usize, frame_bytes: usize) -> CaptureResult<Self> {
        let total = slots
            .checked_mul(frame_bytes)
            .ok_or(CaptureError::SizeOverflow {
                context: "frame ring size",
            })?;
        if isize::try_from(total).is_err() {
            return Err(CaptureError::SizeOverflow {
                context: "frame ring size",
            });
        }

        tracing::debug!(slots, frame_bytes, total, "Allocating frame ring");
        let slots = (0..slots)
            .map(|_| FrameData::with_capacity(frame_bytes))
            .collect();

        Ok(Self {
            slots,
            frame_bytes,
            len: 0,
        })
    }

    /// Number of frames stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// No frame stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of allocated slots.
    #[must_use]
    pub fn slots(&self) -> usize {
        self.slots.len()
    }

    /// Every slot holds a frame.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Capacity of one slot in bytes.
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Fill the next slot with `fill`, which writes pixels and returns the byte count.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::RingFull`] when every slot is used, or the
    /// error returned by `fill`. A failed fill does not consume the slot.
    pub fn push_with<F>(&mut self, buffer_index: u32, fill: F) -> CaptureResult<&FrameData>
    where
        F: FnOnce(&mut [u8]) -> Result<usize, SourceError>,
    {
        let slot_count = self.slots.len();
        let frame_number = self.len as u64;
        let slot = self
            .slots
            .get_mut(self.len)
            .ok_or(CaptureError::RingFull { slots: slot_count })?;

        slot.reset();
        let written = fill(slot.pixels.as_mut_slice())?;
        slot.actual_len = written.min(slot.pixels.len());
        slot.frame_number = frame_number;
        slot.buffer_index = buffer_index;
        slot.timestamp_ns = chrono::Utc::now()
            .timestamp_nanos_opt()
            .and_then(|ns| u64::try_from(ns).ok())
            .unwrap_or(0);

        self.len += 1;
        Ok(&self.slots[self.len - 1])
    }

    /// Stored frames in capture order.
    pub fn frames(&self) -> impl Iterator<Item = &FrameData> {
        self.slots[..self.len].iter()
    }

    /// Forget all frames, keeping the allocation.
    pub fn clear(&mut self) {
        for slot in &mut self.slots[..self.len] {
            slot.reset();
        }
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_with(value: u8) -> impl FnOnce(&mut [u8]) -> Result<usize, SourceError> {
        move |dst| {
            dst.fill(value);
            Ok(dst.len())
        }
    }

    #[test]
    fn test_push_fills_slots_in_order() {
        let mut ring = FrameRing::new(3, 4).unwrap();
        ring.push_with(1, fill_with(7)).unwrap();
        ring.push_with(2, fill_with(9)).unwrap();

        let frames: Vec<_> = ring.frames().collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].frame_number, 0);
        assert_eq!(frames[0].buffer_index, 1);
        assert_eq!(frames[1].pixel_data(), &[9, 9, 9, 9]);
        assert!(frames[1].timestamp_ns > 0);
    }

    #[test]
    fn test_ring_refuses_more_frames_than_slots() {
        let mut ring = FrameRing::new(2, 4).unwrap();
        ring.push_with(1, fill_with(1)).unwrap();
        ring.push_with(2, fill_with(2)).unwrap();
        assert!(ring.is_full());

        let err = ring.push_with(3, fill_with(3)).unwrap_err();
        assert!(matches!(err, CaptureError::RingFull { slots: 2 }));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_failed_fill_keeps_slot_free() {
        let mut ring = FrameRing::new(1, 4).unwrap();
        let err = ring
            .push_with(1, |_| Err(SourceError::NotOpen))
            .unwrap_err();
        assert!(matches!(err, CaptureError::Source(SourceError::NotOpen)));
        assert!(ring.is_empty());
    }

    #[test]
    fn test_size_overflow_rejected() {
        assert!(matches!(
            FrameRing::new(usize::MAX, 2),
            Err(CaptureError::SizeOverflow { .. })
        ));
    }

    #[test]
    fn test_clear_keeps_allocation() {
        let mut ring = FrameRing::new(2, 4).unwrap();
        ring.push_with(1, fill_with(1)).unwrap();
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.slots(), 2);
    }
}
