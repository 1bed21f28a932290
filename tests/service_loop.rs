//! End-to-end capture service tests over loopback UDP.

use grabsync::config::{ExportFormat, GrabSyncConfig};
use grabsync::control::ControlChannel;
use grabsync::export::{output_file_name, output_stem, sidecar_path};
use grabsync::grabber::{FrameSource, SimulatedGrabber};
use grabsync::remote::RemoteHost;
use grabsync::service::CaptureService;
use grabsync::session::{CaptureParams, RunFlag, Stimulus};
use grabsync::CaptureError;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

const WIDTH: u32 = 16;
const HEIGHT: u32 = 4;

fn config_for(output_dir: &Path) -> GrabSyncConfig {
    let mut config = GrabSyncConfig::default();
    config.control.bind = "127.0.0.1:0".parse().unwrap();
    config.export.output_dir = output_dir.to_path_buf();
    config
}

async fn start(
    config: GrabSyncConfig,
    grabber: SimulatedGrabber,
) -> (CaptureService<SimulatedGrabber>, RemoteHost) {
    let mut channel = ControlChannel::bind(config.control.clone()).await.unwrap();
    let remote = RemoteHost::connect(
        "127.0.0.1:0".parse().unwrap(),
        channel.local_addr().unwrap(),
        Duration::from_secs(10),
    )
    .await
    .unwrap();
    channel.set_peer(Some(remote.local_addr().unwrap()));
    (CaptureService::with_channel(config, channel, grabber), remote)
}

fn saved(signal: i32, num_images: u32) -> CaptureParams {
    CaptureParams {
        stimulus: Stimulus::Saved { signal },
        freq: 30,
        fps: 1000,
        num_images,
        pulse_time: 20,
        delay_time: 0.25,
    }
}

fn electrical(num_images: u32) -> CaptureParams {
    CaptureParams {
        stimulus: Stimulus::Electrical {
            vert_ampl: 3,
            horiz_ampl: 5,
            phase_offset: 90,
        },
        freq: 12,
        fps: 500,
        num_images,
        pulse_time: 15,
        delay_time: 1.5,
    }
}

#[tokio::test]
async fn two_sessions_then_stop_flag() {
    let dir = tempdir().unwrap();
    let grabber = SimulatedGrabber::builder()
        .geometry(WIDTH, HEIGHT)
        .frame_interval(Duration::from_micros(100))
        .build();
    let (mut service, mut remote) = start(config_for(dir.path()), grabber).await;

    let first = saved(4, 21);
    let second = electrical(11);
    let driver = tokio::spawn(async move {
        remote.request_capture(&first).await?;
        remote.finish_session(RunFlag(1)).await?;
        remote.request_capture(&second).await?;
        remote.finish_session(RunFlag(0)).await?;
        Ok::<_, CaptureError>(())
    });

    let sessions = tokio::time::timeout(Duration::from_secs(30), service.run())
        .await
        .expect("service loop timed out")
        .unwrap();
    driver.await.unwrap().unwrap();
    assert_eq!(sessions, 2);

    let frame_bytes = (WIDTH * HEIGHT) as u64;
    for (params, frames) in [(first, 20u64), (second, 10u64)] {
        let avi = dir.path().join(output_file_name(&params, "Mikrotron"));
        let bytes = std::fs::read(&avi).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"AVI ");
        // total frames in the main header
        assert_eq!(u32::from_le_bytes(bytes[48..52].try_into().unwrap()) as u64, frames);
        assert!(bytes.len() as u64 > frames * frame_bytes);

        let sidecar: serde_json::Value =
            serde_json::from_slice(&std::fs::read(sidecar_path(&avi)).unwrap()).unwrap();
        assert_eq!(sidecar["report"]["frames_captured"], frames);
        assert_eq!(sidecar["frames"].as_array().unwrap().len() as u64, frames);
    }
}

#[tokio::test]
async fn grabber_that_opens_on_retry_still_captures() {
    let dir = tempdir().unwrap();
    let grabber = SimulatedGrabber::builder()
        .geometry(WIDTH, HEIGHT)
        .failing_opens(1)
        .build();
    let (mut service, mut remote) = start(config_for(dir.path()), grabber).await;

    let params = saved(1, 5);
    let driver = tokio::spawn(async move {
        remote.request_capture(&params).await?;
        remote.finish_session(RunFlag(0)).await
    });

    assert_eq!(service.run().await.unwrap(), 1);
    driver.await.unwrap().unwrap();
    assert_eq!(service.source().lock().await.open_attempts(), 2);
}

#[tokio::test]
async fn tiff_sequence_export() {
    let dir = tempdir().unwrap();
    let mut config = config_for(dir.path());
    config.export.format = ExportFormat::Tiff;
    config.export.write_sidecar = false;
    let grabber = SimulatedGrabber::builder().geometry(WIDTH, HEIGHT).build();
    let (mut service, _remote) = start(config, grabber).await;

    let params = electrical(4);
    let summary = service.run_session(&params).await.unwrap();
    assert!(summary.sidecar.is_none());

    let session_dir = dir.path().join(output_stem(&params, "Mikrotron"));
    let mut names: Vec<_> = std::fs::read_dir(&session_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(
        names,
        ["frame_000000.tif", "frame_000001.tif", "frame_000002.tif"]
    );

    let first = image::open(session_dir.join("frame_000000.tif"))
        .unwrap()
        .into_luma8();
    assert_eq!(first.dimensions(), (WIDTH, HEIGHT));
    // simulated pixels start at the buffer index, and slot 0 holds buffer 1
    assert_eq!(first.get_pixel(0, 0).0, [1]);
}

#[tokio::test]
async fn stalled_grabber_is_aborted() {
    let dir = tempdir().unwrap();
    let mut config = config_for(dir.path());
    config.grabber.stall_timeout_ms = 50;
    config.grabber.poll_interval_us = 500;
    let grabber = SimulatedGrabber::builder()
        .geometry(WIDTH, HEIGHT)
        .stall_after(2)
        .build();
    let (mut service, _remote) = start(config, grabber).await;

    let summary = service.run_session(&saved(2, 10)).await.unwrap();
    assert!(summary.report.stalled);
    assert_eq!(summary.report.frames_captured, 2);
    assert!(summary.report.fault_report.is_some());
    assert!(!service.source().lock().await.is_open());
}
