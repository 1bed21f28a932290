//! Frame ring acquisition.
//!
//! [`Acquirer`] watches a [`FrameSource`](crate::grabber::FrameSource) for
//! completed buffers and copies each one into the next slot of a
//! pre-allocated [`FrameRing`].

pub mod acquirer;
pub mod frame_data;
pub mod ring;

pub use acquirer::{Acquirer, CaptureReport};
pub use frame_data::{FrameData, FrameMeta};
pub use ring::FrameRing;
