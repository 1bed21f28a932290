//! Datagram control channel and its text wire format.

pub mod channel;
pub mod message;

pub use channel::{ControlChannel, Datagram};
pub use message::{parse_capture_command, parse_run_flag, ACK_REPLY, READY_REPLY};
