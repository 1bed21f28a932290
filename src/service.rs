//! Capture service loop.
//!
//! One iteration per session:
//!
//! 1. wait for a start command on the control channel
//! 2. open the frame grabber (with retry) and allocate the frame ring
//! 3. reply [`READY_REPLY`]
//! 4. run a sequence capture of `num_images - 1` frames
//! 5. wait for the grabber to go idle, export, report faults
//! 6. close the grabber
//! 7. wait for the run flag and reply [`ACK_REPLY`]
//!
//! The loop ends when the run flag is zero.

use crate::acquire::{Acquirer, CaptureReport, FrameRing};
use crate::config::{ExportConfig, GrabSyncConfig};
use crate::control::{parse_capture_command, parse_run_flag, ControlChannel, ACK_REPLY, READY_REPLY};
use crate::error::{CaptureError, CaptureResult};
use crate::export::{exporter_for, output_stem, write_sidecar, ExportSummary, SequenceExporter, Sidecar};
use crate::grabber::{open_with_retry, FrameGeometry, FrameSource, GrabberGuard, RetryPolicy};
use crate::session::{CaptureParams, RunFlag};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Result of one capture session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Parameters from the start command
    pub params: CaptureParams,
    /// Frame size the grabber reported
    pub geometry: FrameGeometry,
    /// Acquisition outcome
    pub report: CaptureReport,
    /// `None` when nothing was captured
    pub export: Option<ExportSummary>,
    /// Sidecar path, when one was written
    pub sidecar: Option<PathBuf>,
}

/// Runs capture sessions on behalf of the remote host.
pub struct CaptureService<S: FrameSource + 'static> {
    config: GrabSyncConfig,
    channel: ControlChannel,
    source: Arc<Mutex<S>>,
    retry: RetryPolicy,
    acquirer: Acquirer,
    cancel: Arc<AtomicBool>,
}

impl<S: FrameSource + 'static> CaptureService<S> {
    /// Bind the control channel from `config.control`.
    ///
    /// # Errors
    ///
    /// Returns an error if the control socket cannot be bound.
    pub async fn bind(config: GrabSyncConfig, source: S) -> CaptureResult<Self> {
        let channel = ControlChannel::bind(config.control.clone()).await?;
        Ok(Self::with_channel(config, channel, source))
    }

    /// Serve on an already bound control channel.
    #[must_use]
    pub fn with_channel(config: GrabSyncConfig, channel: ControlChannel, source: S) -> Self {
        Self {
            retry: RetryPolicy::from(&config.grabber),
            acquirer: Acquirer::from(&config.grabber),
            config,
            channel,
            source: Arc::new(Mutex::new(source)),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Address of the control socket.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the OS cannot report the address.
    pub fn local_addr(&self) -> CaptureResult<SocketAddr> {
        self.channel.local_addr()
    }

    /// Flag that stops a capture in progress when set.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Shared handle to the frame source.
    #[must_use]
    pub fn source(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.source)
    }

    /// Serve sessions until the remote host sends a zero run flag.
    ///
    /// Returns the number of sessions run. A request for more frames than the
    /// ring or the export format can hold is refused before the ready reply,
    /// and the loop waits for the next command.
    ///
    /// # Errors
    ///
    /// Any socket, grabber, or export failure ends the loop.
    pub async fn run(&mut self) -> CaptureResult<usize> {
        let mut run_flag = RunFlag(1);
        let mut sessions = 0;

        while run_flag.keep_running() {
            if self.cancel.load(Ordering::Relaxed) {
                tracing::info!("Cancelled, leaving service loop");
                break;
            }

            let params = self.next_command().await?;
            let summary = match self.run_session(&params).await {
                Ok(summary) => summary,
                Err(CaptureError::TooManyFrames { requested, max }) => {
                    tracing::warn!(requested, max, "Refusing capture request");
                    continue;
                }
                Err(err) => return Err(err),
            };
            sessions += 1;
            tracing::info!(
                session = sessions,
                frames = summary.report.frames_captured,
                artifact = ?summary.export.as_ref().map(|e| e.path.display().to_string()),
                "Session complete"
            );

            run_flag = self.next_run_flag(run_flag).await?;
            tracing::info!(run_flag = run_flag.0, "Run flag");
            self.channel.send_text(ACK_REPLY).await?;
        }

        tracing::info!(sessions, "Service loop finished");
        Ok(sessions)
    }

    /// Wait for a well-formed start command. Malformed datagrams are logged and dropped.
    async fn next_command(&mut self) -> CaptureResult<CaptureParams> {
        loop {
            let datagram = self.channel.recv().await?;
            match datagram.text().and_then(parse_capture_command) {
                Ok(params) => {
                    tracing::info!(
                        from = %datagram.from,
                        identifier = %params.stimulus.identifier(),
                        num_images = params.num_images,
                        fps = params.fps,
                        "Start command"
                    );
                    return Ok(params);
                }
                Err(err) => {
                    tracing::warn!(from = %datagram.from, error = %err, "Ignoring malformed command");
                }
            }
        }
    }

    /// Wait for the run flag. An unparseable flag leaves the previous value in place.
    async fn next_run_flag(&mut self, previous: RunFlag) -> CaptureResult<RunFlag> {
        let datagram = self.channel.recv().await?;
        match datagram.text().and_then(parse_run_flag) {
            Ok(flag) => Ok(flag),
            Err(err) => {
                tracing::warn!(
                    from = %datagram.from,
                    error = %err,
                    keep = previous.0,
                    "Unreadable run flag"
                );
                Ok(previous)
            }
        }
    }

    /// Run one capture session: open, announce, capture, export, close.
    ///
    /// # Errors
    ///
    /// Fails if the request exceeds `capture.max_frames` or what the export
    /// format can hold, the grabber cannot be opened, or the capture or export
    /// fails. The grabber is closed in every case.
    pub async fn run_session(&mut self, params: &CaptureParams) -> CaptureResult<SessionSummary> {
        let target = params.target_frames();
        let max = self.config.capture.max_frames;
        if target > max {
            return Err(CaptureError::TooManyFrames {
                requested: target,
                max,
            });
        }

        let exporter = exporter_for(&self.config.export);
        let (geometry, ring) = self.prepare(target, exporter.as_ref()).await?;

        let job = CaptureJob {
            params: *params,
            geometry,
            target,
            acquirer: self.acquirer.clone(),
            exporter,
            export: self.config.export.clone(),
            cancel: Arc::clone(&self.cancel),
        };
        let source = Arc::clone(&self.source);

        tokio::task::spawn_blocking(move || {
            let mut source = source.blocking_lock();
            let mut guard = GrabberGuard::new(&mut *source);
            let result = job.execute(&mut *guard, ring);
            drop(guard);
            result
        })
        .await
        .map_err(|e| CaptureError::Task(e.to_string()))?
    }

    /// Open the grabber, check the export can hold the sequence, allocate the
    /// ring, and tell the peer the sequence is starting.
    async fn prepare(
        &self,
        target: usize,
        exporter: &dyn SequenceExporter,
    ) -> CaptureResult<(FrameGeometry, FrameRing)> {
        let mut source = self.source.lock().await;
        let geometry = open_with_retry(&mut *source, &self.retry).await?;
        let guard = GrabberGuard::new(&mut *source);

        exporter.check_capacity(target, &geometry)?;
        let ring = FrameRing::new(target, geometry.frame_bytes()?)?;
        self.channel.send_text(READY_REPLY).await?;

        guard.disarm();
        Ok((geometry, ring))
    }
}

/// Work done on the blocking thread while the grabber is open.
struct CaptureJob {
    params: CaptureParams,
    geometry: FrameGeometry,
    target: usize,
    acquirer: Acquirer,
    exporter: Box<dyn SequenceExporter>,
    export: ExportConfig,
    cancel: Arc<AtomicBool>,
}

impl CaptureJob {
    fn execute<S: FrameSource + ?Sized>(
        self,
        source: &mut S,
        mut ring: FrameRing,
    ) -> CaptureResult<SessionSummary> {
        let frames = u32::try_from(self.target).map_err(|_| CaptureError::TooManyFrames {
            requested: self.target,
            max: u32::MAX as usize,
        })?;
        source.start_sequence(frames)?;

        let report = self
            .acquirer
            .run(source, &mut ring, self.target, &self.cancel)?;
        if let Some(fault) = &report.fault_report {
            tracing::warn!(fault = %fault, "Frame grabber reported faults");
        }

        if ring.is_empty() {
            tracing::warn!("No frames captured, nothing to export");
            return Ok(SessionSummary {
                params: self.params,
                geometry: self.geometry,
                report,
                export: None,
                sidecar: None,
            });
        }

        std::fs::create_dir_all(&self.export.output_dir)?;
        let stem = output_stem(&self.params, &self.export.file_prefix);
        let path = self
            .export
            .output_dir
            .join(self.exporter.artifact_name(&stem));
        let export = self.exporter.export(&ring, &self.geometry, &path)?;

        let sidecar = if self.export.write_sidecar {
            Some(write_sidecar(&Sidecar::new(
                &export.path,
                &self.params,
                &self.geometry,
                &report,
                &ring,
            ))?)
        } else {
            None
        };

        Ok(SessionSummary {
            params: self.params,
            geometry: self.geometry,
            report,
            export: Some(export),
            sidecar,
        })
    }
}
