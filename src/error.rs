//! Custom error types for the capture service.
//!
//! This module defines the primary error type, `CaptureError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the kinds of errors that can occur while synchronizing with the remote host,
//! driving the frame grabber and exporting a sequence.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps [`ConfigError`], raised while loading or validating the
//!   figment configuration.
//! - **`Io`**: Wraps `std::io::Error`, covering socket and file I/O.
//! - **`Protocol`**: Wraps [`ProtocolError`], a datagram that could not be parsed as a
//!   command or run flag.
//! - **`Source`**: Wraps [`SourceError`], a failure reported by the frame source
//!   (the vendor SDK boundary).
//! - **`RingFull`**, **`FrameTooLarge`**, **`FrameDimensionsTooLarge`**, **`SizeOverflow`**:
//!   hard-limit violations on the in-memory frame ring.
//! - **`OpenFailed`**: the frame grabber refused to open after every retry attempt.
//! - **`NoPeer`**: a reply was requested before any peer address was known.
//! - **`Export`**: the sequence exporter could not write the artifact.
//!
//! By using `#[from]`, `CaptureError` can be created from the underlying error types,
//! simplifying error handling with the `?` operator.

use thiserror::Error;

pub use crate::config::ConfigError;

/// Convenience alias for results using the crate error type.
pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

/// Top-level error for the capture service.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Socket or file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A control datagram did not match the wire format.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The frame grabber driver reported an error.
    #[error("Frame source error: {0}")]
    Source(#[from] SourceError),

    /// Every open attempt failed.
    #[error("Frame grabber did not open after {attempts} attempts: {last}")]
    OpenFailed {
        /// Attempts made
        attempts: u32,
        /// Error from the final attempt
        last: SourceError,
    },

    /// A reply was due before any peer was known.
    #[error("No peer address known; nothing has been received yet")]
    NoPeer,

    /// A frame was pushed into a ring with no free slot.
    #[error("Frame ring is full ({slots} slots)")]
    RingFull {
        /// Slots in the ring
        slots: usize,
    },

    /// The request asks for more frames than can be held or exported.
    #[error("Requested {requested} frames but at most {max} can be captured")]
    TooManyFrames {
        /// Frames the request needs
        requested: usize,
        /// Largest accepted frame count
        max: usize,
    },

    /// One frame exceeds [`MAX_FRAME_BYTES`](crate::grabber::MAX_FRAME_BYTES).
    #[error("Frame of {bytes} bytes exceeds the {max_bytes} byte limit")]
    FrameTooLarge {
        /// Frame size
        bytes: usize,
        /// Limit
        max_bytes: usize,
    },

    /// A frame dimension exceeds [`MAX_FRAME_DIMENSION`](crate::grabber::MAX_FRAME_DIMENSION).
    #[error("Frame dimensions {width}x{height} exceed the maximum of {max_dimension}")]
    FrameDimensionsTooLarge {
        /// Reported width
        width: u32,
        /// Reported height
        height: u32,
        /// Limit for either dimension
        max_dimension: u32,
    },

    /// A size computation overflowed.
    #[error("Integer overflow computing {context}")]
    SizeOverflow {
        /// What was being sized
        context: &'static str,
    },

    /// Writing the artifact failed.
    #[error("Export failed: {0}")]
    Export(String),

    /// The blocking capture task panicked or was cancelled.
    #[error("Capture task failed: {0}")]
    Task(String),
}

/// A datagram that does not match the control wire format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Nothing but whitespace or padding.
    #[error("empty message")]
    Empty,

    /// The leading character is neither `S` nor `E`.
    #[error("unknown stimulus identifier '{0}'")]
    UnknownIdentifier(char),

    /// Wrong number of comma-separated fields.
    #[error("expected {expected} fields after '{identifier}', found {found}")]
    FieldCount {
        /// Stimulus identifier
        identifier: char,
        /// Fields this identifier takes
        expected: usize,
        /// Fields present
        found: usize,
    },

    /// A field does not parse as a number.
    #[error("field '{field}' is not a valid number: {value:?}")]
    InvalidNumber {
        /// Field name
        field: &'static str,
        /// Raw text
        value: String,
    },

    /// A field parses but is not usable.
    #[error("field '{field}' is out of range: {value}")]
    OutOfRange {
        /// Field name
        field: &'static str,
        /// Parsed value
        value: i64,
    },

    /// The payload is not UTF-8 text.
    #[error("message is not valid UTF-8")]
    NotUtf8,

    /// The peer answered with something other than the expected reply.
    #[error("expected reply {expected:?}, got {got:?}")]
    UnexpectedReply {
        /// Reply waited for
        expected: &'static str,
        /// Reply received
        got: String,
    },
}

/// Failure reported by a [`FrameSource`](crate::grabber::FrameSource).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The driver refused to open the device.
    #[error("open error {code}: {message}")]
    Open {
        /// Driver status code
        code: i32,
        /// Driver message
        message: String,
    },

    /// The operation needs an open device.
    #[error("frame source is not open")]
    NotOpen,

    /// No completed buffer has this index.
    #[error("buffer {index} is out of range 1..={count}")]
    BufferOutOfRange {
        /// Requested buffer
        index: u32,
        /// Buffers in the sequence
        count: u32,
    },

    /// The copy destination is smaller than one frame.
    #[error("destination holds {capacity} bytes but a frame needs {needed}")]
    ShortDestination {
        /// Destination length
        capacity: usize,
        /// Frame length
        needed: usize,
    },

    /// Any other driver failure.
    #[error("{0}")]
    Device(String),
}
