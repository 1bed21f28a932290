//! Frame-grabber sequence capture synchronized over UDP.
//!
//! A remote stimulus host sends a textual capture command over a datagram
//! control channel. This crate opens the frame grabber, replies that the
//! sequence is starting, copies every completed driver buffer into a
//! pre-allocated frame ring, exports the sequence to a file named after the
//! session parameters, and acknowledges the run flag that decides whether
//! another session follows.
//!
//! The modules, bottom-up:
//!
//! - [`config`]: figment configuration (TOML file and `GRABSYNC_` environment)
//! - [`error`]: crate error types
//! - [`session`]: capture parameters and the run flag
//! - [`control`]: UDP control channel and wire format
//! - [`grabber`]: the frame source boundary, open retry, and a simulated grabber
//! - [`acquire`]: the frame ring and the buffer-completion poller
//! - [`export`]: AVI and TIFF sequence exporters with JSON sidecars
//! - [`service`]: the capture service loop
//! - [`remote`]: the stimulus-host side of the protocol

pub mod acquire;
pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod export;
pub mod grabber;
pub mod remote;
pub mod service;
pub mod session;

pub use error::{CaptureError, CaptureResult};
