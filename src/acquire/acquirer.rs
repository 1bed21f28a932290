//! Poll loop that copies completed driver buffers into the frame ring.

use super::ring::FrameRing;
use crate::config::GrabberConfig;
use crate::error::CaptureResult;
use crate::grabber::{BufferIndex, FrameSource};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Outcome of one acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureReport {
    /// Frames copied into the ring
    pub frames_captured: usize,
    /// Frames requested
    pub target: usize,
    /// The source went idle before the target was reached
    pub source_stopped: bool,
    /// No buffer completed within the stall timeout and the source was aborted
    pub stalled: bool,
    /// The cancellation flag was raised
    pub cancelled: bool,
    /// Time from the first poll until the source was idle
    pub elapsed: Duration,
    /// Driver fault report, if any
    pub fault_report: Option<String>,
}

impl CaptureReport {
    /// Every requested frame was captured.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.frames_captured >= self.target
    }
}

/// Buffer completion poller.
///
/// With no `poll_interval` the loop spins on [`std::hint::spin_loop`], which
/// is what a high-speed camera needs to keep up; run it on a blocking thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acquirer {
    /// Sleep between polls. `None` spins.
    pub poll_interval: Option<Duration>,
    /// Abort when no buffer completes for this long. `None` waits forever.
    pub stall_timeout: Option<Duration>,
}

impl From<&GrabberConfig> for Acquirer {
    fn from(config: &GrabberConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            stall_timeout: config.stall_timeout(),
        }
    }
}

impl Acquirer {
    fn pause(&self) {
        match self.poll_interval {
            Some(interval) => std::thread::sleep(interval),
            None => std::hint::spin_loop(),
        }
    }

    /// Copy buffers `after + 1 ..= upto` into the ring, stopping at `target`.
    fn copy_range<S: FrameSource + ?Sized>(
        source: &S,
        ring: &mut FrameRing,
        after: BufferIndex,
        upto: BufferIndex,
        target: usize,
    ) -> CaptureResult<()> {
        for index in after + 1..=upto {
            if ring.len() >= target {
                break;
            }
            ring.push_with(index, |dst| source.read_buffer(index, dst))?;
            tracing::trace!(buffer = index, frames = ring.len(), "Buffer copied");
        }
        Ok(())
    }

    /// Poll `source` until `target` frames have been copied into `ring` or the
    /// source stops being live, whichever comes first, then wait for it to go
    /// idle.
    ///
    /// Buffers completed between two polls are all copied, in order. The
    /// sequence must already have been started.
    ///
    /// # Errors
    ///
    /// Propagates ring and driver errors from the copy. The source is aborted
    /// before the error is returned.
    pub fn run<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        ring: &mut FrameRing,
        target: usize,
        cancel: &AtomicBool,
    ) -> CaptureResult<CaptureReport> {
        tracing::info!(source = source.name(), target, "Acquisition started");

        let started = Instant::now();
        let mut last: BufferIndex = 0;
        let mut last_backwards: Option<BufferIndex> = None;
        let mut last_progress = started;
        let mut source_stopped = false;
        let mut stalled = false;
        let mut cancelled = false;

        while ring.len() < target {
            let current = source.captured_buffer();
            if current > last {
                if let Err(err) = Self::copy_range(source, ring, last, current, target) {
                    source.abort();
                    return Err(err);
                }
                last = current;
                last_progress = Instant::now();
                continue;
            }
            // buffers up to `last` are already in the ring
            if current < last && last_backwards != Some(current) {
                tracing::warn!(last, current, "Captured buffer index went backwards");
                last_backwards = Some(current);
            }

            if cancel.load(Ordering::Relaxed) {
                tracing::warn!(frames = ring.len(), "Acquisition cancelled");
                source.abort();
                cancelled = true;
                break;
            }

            if !source.is_live() {
                // a buffer may have completed between the last poll and going idle
                let current = source.captured_buffer();
                if current > last {
                    Self::copy_range(source, ring, last, current, target)?;
                }
                source_stopped = ring.len() < target;
                if source_stopped {
                    tracing::warn!(frames = ring.len(), target, "Source stopped before target");
                }
                break;
            }

            if let Some(timeout) = self.stall_timeout {
                if last_progress.elapsed() >= timeout {
                    tracing::error!(
                        frames = ring.len(),
                        target,
                        timeout_ms = timeout.as_millis() as u64,
                        "No buffer completed within the stall timeout, aborting"
                    );
                    source.abort();
                    stalled = true;
                    break;
                }
            }

            self.pause();
        }

        self.wait_idle(source, cancel);

        let report = CaptureReport {
            frames_captured: ring.len(),
            target,
            source_stopped,
            stalled,
            cancelled,
            elapsed: started.elapsed(),
            fault_report: source.fault_report(),
        };
        tracing::info!(
            frames = report.frames_captured,
            target,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Acquisition finished"
        );
        Ok(report)
    }

    /// Wait for the source to finish its sequence. Bounded by the stall
    /// timeout when one is set.
    fn wait_idle<S: FrameSource + ?Sized>(&self, source: &mut S, cancel: &AtomicBool) {
        let waiting = Instant::now();
        while source.is_live() {
            let timed_out = self
                .stall_timeout
                .is_some_and(|timeout| waiting.elapsed() >= timeout);
            if timed_out || cancel.load(Ordering::Relaxed) {
                tracing::warn!("Source still live after capture, aborting");
                source.abort();
                break;
            }
            self.pause();
        }
    }
}
