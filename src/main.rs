//! `grabsync` binary: capture service and stimulus-host client.

use anyhow::{Context, Result};
use clap::Parser;
use grabsync::cli::{Cli, Command, SendArgs, ServeArgs};
use grabsync::config::{GrabSyncConfig, LogFormat};
use grabsync::grabber::{FrameSource, SimulatedGrabber};
use grabsync::remote::RemoteHost;
use grabsync::service::CaptureService;
use grabsync::session::RunFlag;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => GrabSyncConfig::load_from(path),
        None => GrabSyncConfig::load(),
    }
    .context("Failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.application.log_level = level.clone();
    }

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.application.log_level));
    match config.application.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => serve(config, &args).await,
        Command::Send(args) => send(&args).await,
    }
}

async fn serve(mut config: GrabSyncConfig, args: &ServeArgs) -> Result<()> {
    args.apply(&mut config);
    tracing::info!(
        app = %config.application.name,
        bind = %config.control.bind,
        output_dir = %config.export.output_dir.display(),
        "Starting capture service"
    );

    let source = SimulatedGrabber::from_config(&config.grabber);
    let mut service = CaptureService::bind(config, source)
        .await
        .context("Failed to bind control socket")?;
    let cancel = service.cancel_flag();
    let grabber = service.source();

    tokio::select! {
        result = service.run() => {
            let sessions = result.context("Capture service failed")?;
            tracing::info!(sessions, "Capture service stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, closing frame grabber");
            cancel.store(true, Ordering::Relaxed);
        }
    }

    // waits for a capture in progress to observe the cancel flag
    let mut grabber = grabber.lock().await;
    if grabber.is_open() {
        grabber.close();
    }
    Ok(())
}

async fn send(args: &SendArgs) -> Result<()> {
    let params = args.params().context("Invalid start command")?;
    let mut remote = RemoteHost::connect(
        args.bind,
        args.service,
        Duration::from_secs(args.timeout_secs),
    )
    .await
    .context("Failed to bind local socket")?;

    remote
        .request_capture(&params)
        .await
        .context("Capture service did not confirm the sequence")?;
    remote
        .finish_session(RunFlag(args.run_flag))
        .await
        .context("Capture service did not acknowledge the run flag")?;

    tracing::info!(run_flag = args.run_flag, "Session finished");
    Ok(())
}
