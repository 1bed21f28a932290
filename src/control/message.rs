//! Control wire format.
//!
//! Commands are plain text: a one-character stimulus identifier followed by
//! positional numeric fields, each separated by one delimiter character
//! (normally `,`) and optional whitespace. There is no length prefix, version
//! or checksum.
//!
//! ```text
//! S, <signal>, <freq>, <fps>, <num_images>, <pulse_time>, <delay_time>
//! E, <freq>, <vert_ampl>, <horiz_ampl>, <phase_offset>, <fps>, <num_images>, <pulse_time>, <delay_time>
//! ```
//!
//! After each session the remote host sends a bare integer run flag.

use crate::error::ProtocolError;
use crate::session::{CaptureParams, RunFlag, Stimulus};
use std::str::FromStr;

/// Sent once the frame grabber is open and about to start the sequence.
pub const READY_REPLY: &str = "Start sequence AVI.";

/// Sent after the run flag of a session has been received.
pub const ACK_REPLY: &str = "Message received.";

const SAVED_FIELDS: usize = 6;
const ELECTRICAL_FIELDS: usize = 8;

/// Strip the padding a C sender leaves behind (NUL bytes, CR/LF, spaces).
fn clean(text: &str) -> &str {
    text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
}

fn fields(rest: &str) -> Vec<&str> {
    rest.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect()
}

fn number<T: FromStr>(field: &'static str, value: &str) -> Result<T, ProtocolError> {
    value.parse().map_err(|_| ProtocolError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Parse a start command.
///
/// # Errors
///
/// Returns a [`ProtocolError`] if the identifier is unknown, the field count is
/// wrong, a field is not a number, or fewer than two images are requested.
pub fn parse_capture_command(text: &str) -> Result<CaptureParams, ProtocolError> {
    let text = clean(text);
    let mut chars = text.chars();
    let identifier = chars.next().ok_or(ProtocolError::Empty)?;
    let values = fields(chars.as_str());

    let expected = match identifier {
        'S' => SAVED_FIELDS,
        'E' => ELECTRICAL_FIELDS,
        other => return Err(ProtocolError::UnknownIdentifier(other)),
    };
    if values.len() != expected {
        return Err(ProtocolError::FieldCount {
            identifier,
            expected,
            found: values.len(),
        });
    }

    let params = if identifier == 'S' {
        CaptureParams {
            stimulus: Stimulus::Saved {
                signal: number("signal", values[0])?,
            },
            freq: number("freq", values[1])?,
            fps: number("fps", values[2])?,
            num_images: number("num_images", values[3])?,
            pulse_time: number("pulse_time", values[4])?,
            delay_time: number("delay_time", values[5])?,
        }
    } else {
        CaptureParams {
            freq: number("freq", values[0])?,
            stimulus: Stimulus::Electrical {
                vert_ampl: number("vert_ampl", values[1])?,
                horiz_ampl: number("horiz_ampl", values[2])?,
                phase_offset: number("phase_offset", values[3])?,
            },
            fps: number("fps", values[4])?,
            num_images: number("num_images", values[5])?,
            pulse_time: number("pulse_time", values[6])?,
            delay_time: number("delay_time", values[7])?,
        }
    };

    if params.num_images < 2 {
        return Err(ProtocolError::OutOfRange {
            field: "num_images",
            value: i64::from(params.num_images),
        });
    }
    if !params.delay_time.is_finite() {
        return Err(ProtocolError::InvalidNumber {
            field: "delay_time",
            value: params.delay_time.to_string(),
        });
    }

    Ok(params)
}

/// Parse the run flag sent after a session.
///
/// Like `sscanf("%d")`, only the leading integer is read; anything after it is ignored.
///
/// # Errors
///
/// Returns a [`ProtocolError`] if the message does not start with an integer.
pub fn parse_run_flag(text: &str) -> Result<RunFlag, ProtocolError> {
    let text = clean(text);
    if text.is_empty() {
        return Err(ProtocolError::Empty);
    }

    let end = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(text.len(), |(i, _)| i);

    number("run_flag", &text[..end]).map(RunFlag)
}

impl CaptureParams {
    /// Format these parameters the way the remote host sends them.
    #[must_use]
    pub fn to_command(&self) -> String {
        match self.stimulus {
            Stimulus::Saved { signal } => format!(
                "S, {}, {}, {}, {}, {}, {}",
                signal, self.freq, self.fps, self.num_images, self.pulse_time, self.delay_time
            ),
            Stimulus::Electrical {
                vert_ampl,
                horiz_ampl,
                phase_offset,
            } => format!(
                "E, {}, {}, {}, {}, {}, {}, {}, {}",
                self.freq,
                vert_ampl,
                horiz_ampl,
                phase_offset,
                self.fps,
                self.num_images,
                self.pulse_time,
                self.delay_time
            ),
        }
    }
}
