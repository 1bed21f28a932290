//! Simulated frame grabber.
//!
//! Buffers complete on a fixed clock once a sequence starts: buffer `n`
//! completes `n * frame_interval` after [`FrameSource::start_sequence`]. Pixel
//! contents are a deterministic ramp offset by the buffer index, so a copied
//! frame can be traced back to the buffer it came from.
//!
//! The builder can inject the failure modes the capture pipeline must handle:
//! opens that fail, sequences that stop early, a device that stalls while
//! still reporting live, and a slow poller that only sees every n-th buffer.

use super::{BufferIndex, FrameGeometry, FrameSource};
use crate::config::GrabberConfig;
use crate::error::SourceError;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Sequence {
    frames: u32,
    started: Instant,
    aborted_at: Option<u32>,
}

/// Software frame source with a configurable clock.
#[derive(Debug)]
pub struct SimulatedGrabber {
    format_file: Option<String>,
    geometry: FrameGeometry,
    frame_interval: Duration,
    failing_opens: u32,
    stop_after: Option<u32>,
    stall_after: Option<u32>,
    report_stride: u32,
    open: bool,
    open_attempts: u32,
    sequence: Option<Sequence>,
}

/// Builder for [`SimulatedGrabber`].
#[derive(Debug, Clone)]
pub struct SimulatedGrabberBuilder {
    format_file: Option<String>,
    geometry: FrameGeometry,
    frame_interval: Duration,
    failing_opens: u32,
    stop_after: Option<u32>,
    stall_after: Option<u32>,
    report_stride: u32,
}

impl Default for SimulatedGrabberBuilder {
    fn default() -> Self {
        Self {
            format_file: None,
            geometry: FrameGeometry::grey8(1024, 150),
            frame_interval: Duration::ZERO,
            failing_opens: 0,
            stop_after: None,
            stall_after: None,
            report_stride: 1,
        }
    }
}

impl SimulatedGrabberBuilder {
    /// Video format file reported when the device opens.
    #[must_use]
    pub fn format_file(mut self, path: impl Into<String>) -> Self {
        self.format_file = Some(path.into());
        self
    }

    /// 8-bit frame size.
    #[must_use]
    pub fn geometry(mut self, width: u32, height: u32) -> Self {
        self.geometry = FrameGeometry::grey8(width, height);
        self
    }

    /// Time between buffer completions. Zero completes the whole sequence at once.
    #[must_use]
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Number of initial `open` calls that fail.
    #[must_use]
    pub fn failing_opens(mut self, count: u32) -> Self {
        self.failing_opens = count;
        self
    }

    /// The device goes idle after this many buffers, short of the sequence length.
    #[must_use]
    pub fn stop_after(mut self, buffers: u32) -> Self {
        self.stop_after = Some(buffers);
        self
    }

    /// No buffer completes after this many, yet the device stays live.
    #[must_use]
    pub fn stall_after(mut self, buffers: u32) -> Self {
        self.stall_after = Some(buffers);
        self
    }

    /// Only every `stride`-th completion is visible through
    /// [`FrameSource::captured_buffer`], as if the poller were too slow.
    #[must_use]
    pub fn report_stride(mut self, stride: u32) -> Self {
        self.report_stride = stride.max(1);
        self
    }

    /// Finish the grabber. It starts closed.
    #[must_use]
    pub fn build(self) -> SimulatedGrabber {
        SimulatedGrabber {
            format_file: self.format_file,
            geometry: self.geometry,
            frame_interval: self.frame_interval,
            failing_opens: self.failing_opens,
            stop_after: self.stop_after,
            stall_after: self.stall_after,
            report_stride: self.report_stride,
            open: false,
            open_attempts: 0,
            sequence: None,
        }
    }
}

impl SimulatedGrabber {
    /// Builder with a 1024x150 frame and no injected faults.
    #[must_use]
    pub fn builder() -> SimulatedGrabberBuilder {
        SimulatedGrabberBuilder::default()
    }

    /// Grabber matching the `[grabber]` configuration section.
    #[must_use]
    pub fn from_config(config: &GrabberConfig) -> Self {
        let sim = &config.simulated;
        Self::builder()
            .format_file(config.format_file.clone())
            .geometry(sim.width, sim.height)
            .frame_interval(Duration::from_micros(sim.frame_interval_us))
            .build()
    }

    /// Number of `open` calls so far.
    #[must_use]
    pub fn open_attempts(&self) -> u32 {
        self.open_attempts
    }

    /// Buffer count at which the running sequence ends on its own.
    fn end_of(&self, sequence: &Sequence) -> u32 {
        self.stop_after
            .map_or(sequence.frames, |stop| stop.min(sequence.frames))
    }

    /// Buffers completed so far in the running sequence.
    fn completed(&self) -> u32 {
        let Some(sequence) = &self.sequence else {
            return 0;
        };

        let elapsed = if self.frame_interval.is_zero() {
            u32::MAX
        } else {
            let ticks = sequence.started.elapsed().as_nanos() / self.frame_interval.as_nanos();
            u32::try_from(ticks).unwrap_or(u32::MAX)
        };

        let mut done = elapsed.min(self.end_of(sequence));
        if let Some(stall) = self.stall_after {
            done = done.min(stall);
        }
        if let Some(aborted) = sequence.aborted_at {
            done = done.min(aborted);
        }
        done
    }
}

impl FrameSource for SimulatedGrabber {
    fn name(&self) -> &str {
        "simulated"
    }

    fn open(&mut self) -> Result<FrameGeometry, SourceError> {
        self.open_attempts += 1;
        if self.open_attempts <= self.failing_opens {
            return Err(SourceError::Open {
                code: -1,
                message: format!("simulated open failure {}", self.open_attempts),
            });
        }
        tracing::debug!(format_file = ?self.format_file, "Simulated grabber loaded video format");
        self.open = true;
        Ok(self.geometry)
    }

    fn close(&mut self) {
        self.open = false;
        self.sequence = None;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn start_sequence(&mut self, frames: u32) -> Result<(), SourceError> {
        if !self.open {
            return Err(SourceError::NotOpen);
        }
        if frames == 0 {
            return Err(SourceError::Device("sequence needs at least one buffer".into()));
        }
        self.sequence = Some(Sequence {
            frames,
            started: Instant::now(),
            aborted_at: None,
        });
        Ok(())
    }

    fn captured_buffer(&self) -> BufferIndex {
        let done = self.completed();
        let at_end = self
            .sequence
            .as_ref()
            .is_some_and(|sequence| done >= self.end_of(sequence));
        if at_end {
            done
        } else {
            done - done % self.report_stride
        }
    }

    fn is_live(&self) -> bool {
        match &self.sequence {
            Some(sequence) => {
                sequence.aborted_at.is_none() && self.completed() < self.end_of(sequence)
            }
            None => false,
        }
    }

    fn read_buffer(&self, index: BufferIndex, dst: &mut [u8]) -> Result<usize, SourceError> {
        if !self.open {
            return Err(SourceError::NotOpen);
        }
        let count = self.sequence.as_ref().map_or(0, |sequence| sequence.frames);
        if index == 0 || index > count || index > self.completed() {
            return Err(SourceError::BufferOutOfRange { index, count });
        }

        let needed = self.geometry.width as usize
            * self.geometry.height as usize
            * self.geometry.bytes_per_pixel as usize;
        if dst.len() < needed {
            return Err(SourceError::ShortDestination {
                capacity: dst.len(),
                needed,
            });
        }

        for (i, pixel) in dst[..needed].iter_mut().enumerate() {
            *pixel = (i + index as usize) as u8;
        }
        Ok(needed)
    }

    fn abort(&mut self) {
        let done = self.completed();
        if let Some(sequence) = &mut self.sequence {
            sequence.aborted_at.get_or_insert(done);
        }
    }

    fn fault_report(&self) -> Option<String> {
        let sequence = self.sequence.as_ref()?;
        let done = self.completed();
        if let Some(aborted) = sequence.aborted_at {
            return Some(format!(
                "acquisition aborted after {aborted} of {} buffers",
                sequence.frames
            ));
        }
        if !self.is_live() && done < sequence.frames {
            return Some(format!(
                "sequence stopped after {done} of {} buffers",
                sequence.frames
            ));
        }
        None
    }
}
