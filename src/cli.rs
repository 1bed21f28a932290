//! Command-line interface for the `grabsync` binary.

use crate::config::GrabSyncConfig;
use crate::control::parse_capture_command;
use crate::error::ProtocolError;
use crate::session::CaptureParams;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default local address for the `send` subcommand (the stimulus host listens on 9090).
pub const DEFAULT_SEND_BIND: &str = "0.0.0.0:9090";

/// Default seconds to wait for each reply in the `send` subcommand.
pub const DEFAULT_REPLY_TIMEOUT_SECS: u64 = 120;

/// Frame-grabber sequence capture synchronized over UDP.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "grabsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML). Defaults to config/grabsync.toml when present.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Command to run; `serve` when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the capture service (default).
    Serve(ServeArgs),
    /// Act as the stimulus host: request one capture and send the run flag.
    Send(SendArgs),
}

/// Arguments for the serve command.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeArgs {
    /// Control socket address, overriding `control.bind`.
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,

    /// Output directory, overriding `export.output_dir`.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

impl ServeArgs {
    /// Apply the command-line overrides to a loaded configuration.
    pub fn apply(&self, config: &mut GrabSyncConfig) {
        if let Some(bind) = self.bind {
            config.control.bind = bind;
        }
        if let Some(dir) = &self.output_dir {
            config.export.output_dir = dir.clone();
        }
    }
}

/// Arguments for the send command.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct SendArgs {
    /// Capture service address.
    pub service: SocketAddr,

    /// Start command, e.g. "S, 4, 30, 1000, 1500, 20, 0.25".
    pub command: String,

    /// Local address to send from and receive replies on.
    #[arg(long, default_value = DEFAULT_SEND_BIND)]
    pub bind: SocketAddr,

    /// Run flag sent after the session (0 stops the service).
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub run_flag: i32,

    /// Seconds to wait for each reply.
    #[arg(long, default_value_t = DEFAULT_REPLY_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

impl SendArgs {
    /// Parse the start command so it is validated before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if the command is malformed.
    pub fn params(&self) -> Result<CaptureParams, ProtocolError> {
        parse_capture_command(&self.command)
    }
}

/// Parse CLI arguments from an iterator of strings.
///
/// # Errors
///
/// Returns the clap error for invalid arguments, `--help`, or `--version`.
pub fn parse_from<I, T>(iter: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(iter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_defaults_to_serve() {
        let cli = parse_from(["grabsync"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_serve_overrides() {
        let cli = parse_from([
            "grabsync",
            "--config",
            "lab.toml",
            "serve",
            "--bind",
            "127.0.0.1:6000",
            "--output-dir",
            "/tmp/out",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("lab.toml")));

        let Some(Command::Serve(args)) = cli.command else {
            panic!("expected serve");
        };
        let mut config = GrabSyncConfig::default();
        args.apply(&mut config);
        assert_eq!(config.control.bind, "127.0.0.1:6000".parse().unwrap());
        assert_eq!(config.export.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_send_args() {
        let cli = parse_from([
            "grabsync",
            "send",
            "10.0.0.2:51717",
            "E, 12, 3, 5, 90, 500, 200, 15, 1.5",
            "--run-flag",
            "1",
        ])
        .unwrap();
        let Some(Command::Send(args)) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.bind, DEFAULT_SEND_BIND.parse().unwrap());
        assert_eq!(args.run_flag, 1);
        assert_eq!(args.timeout_secs, DEFAULT_REPLY_TIMEOUT_SECS);
        assert_eq!(args.params().unwrap().num_images, 200);
    }

    #[test]
    fn test_send_requires_command() {
        assert!(parse_from(["grabsync", "send", "10.0.0.2:51717"]).is_err());
    }

    #[test]
    fn test_help_flag() {
        let err = parse_from(["grabsync", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
