//! Capture-session parameter set.
//!
//! One [`CaptureParams`] is received from the remote host per session. It has no
//! lifecycle beyond the session it starts.

use serde::{Deserialize, Serialize};

/// Stimulus driven by the remote host while this machine records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stimulus {
    /// Replay of a previously saved signal (identifier `S`).
    Saved {
        /// Saved signal number
        signal: i32,
    },
    /// Generated electrical stimulus (identifier `E`).
    Electrical {
        /// Vertical amplitude
        vert_ampl: i32,
        /// Horizontal amplitude
        horiz_ampl: i32,
        /// Phase offset between the two axes in degrees
        phase_offset: i32,
    },
}

impl Stimulus {
    /// Single-character identifier that leads the command on the wire.
    #[must_use]
    pub fn identifier(&self) -> char {
        match self {
            Stimulus::Saved { .. } => 'S',
            Stimulus::Electrical { .. } => 'E',
        }
    }
}

/// Parameters of one bounded capture run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureParams {
    /// Stimulus description
    pub stimulus: Stimulus,
    /// Stimulus frequency in Hz
    pub freq: i32,
    /// Camera frame rate
    pub fps: u32,
    /// Number of frame buffers in the sequence, including the unused buffer 0
    pub num_images: u32,
    /// Trigger pulse length
    pub pulse_time: i32,
    /// Delay between stimulus start and capture
    pub delay_time: f64,
}

impl CaptureParams {
    /// Number of frames the sequence capture writes.
    ///
    /// The sequence fills buffers `1..num_images`, so one fewer than `num_images`.
    #[must_use]
    pub fn target_frames(&self) -> usize {
        self.num_images.saturating_sub(1) as usize
    }
}

/// Whether the remote host wants another session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunFlag(pub i32);

impl RunFlag {
    /// Zero stops the service loop.
    #[must_use]
    pub fn keep_running(self) -> bool {
        self.0 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_excludes_buffer_zero() {
        let params = CaptureParams {
            stimulus: Stimulus::Saved { signal: 3 },
            freq: 10,
            fps: 1000,
            num_images: 500,
            pulse_time: 20,
            delay_time: 0.5,
        };
        assert_eq!(params.target_frames(), 499);
    }

    #[test]
    fn test_run_flag() {
        assert!(RunFlag(1).keep_running());
        assert!(RunFlag(-1).keep_running());
        assert!(!RunFlag(0).keep_running());
    }
}
