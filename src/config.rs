//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for the capture service.
//! Configuration is loaded from (in order of precedence, highest first):
//! 1. Environment variables prefixed with `GRABSYNC_` (nested keys split on `__`)
//! 2. TOML configuration file (default: `config/grabsync.toml`, optional)
//! 3. Built-in defaults, which reproduce the lab deployment constants
//!
//! # Environment Variable Overrides
//!
//! ```text
//! GRABSYNC_APPLICATION__LOG_LEVEL=debug
//! GRABSYNC_APPLICATION__LOG_FORMAT=json
//! GRABSYNC_CONTROL__BIND=0.0.0.0:51717
//! GRABSYNC_EXPORT__OUTPUT_DIR=/data/high-speed
//! ```
//!
//! # Example
//!
//! ```no_run
//! use grabsync::config::GrabSyncConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = GrabSyncConfig::load()?;
//!     println!("Listening on {}", config.control.bind);
//!     println!("Writing to {}", config.export.output_dir.display());
//!     Ok(())
//! }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/grabsync.toml";

/// Largest payload a single IPv4 UDP datagram can carry.
const MAX_UDP_PAYLOAD: usize = 65_507;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or merged.
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    /// The merged configuration is invalid.
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::LoadError(Box::new(err))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GrabSyncConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Datagram control channel settings
    #[serde(default)]
    pub control: ControlConfig,
    /// Frame grabber settings
    #[serde(default)]
    pub grabber: GrabberConfig,
    /// Capture ring settings
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Sequence export settings
    #[serde(default)]
    pub export: ExportConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationConfig {
    /// Application name (used in log output)
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log line format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Datagram control channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlConfig {
    /// Local address the control socket binds to
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Port on the peer that replies are sent to
    #[serde(default = "default_reply_port")]
    pub reply_port: u16,
    /// Fixed peer address; when unset, replies go to the last sender's IP at `reply_port`
    #[serde(default)]
    pub peer: Option<SocketAddr>,
    /// Receive buffer size in bytes
    #[serde(default = "default_max_datagram")]
    pub max_datagram: usize,
}

/// Frame grabber configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GrabberConfig {
    /// Video format file handed to the driver on open
    #[serde(default = "default_format_file")]
    pub format_file: String,
    /// Number of open attempts before giving up
    #[serde(default = "default_open_attempts")]
    pub open_attempts: u32,
    /// Delay between open attempts in milliseconds
    #[serde(default)]
    pub open_backoff_ms: u64,
    /// Abort the capture when no new buffer completes within this many milliseconds (0 = never)
    #[serde(default)]
    pub stall_timeout_ms: u64,
    /// Sleep between buffer polls in microseconds (0 = spin)
    #[serde(default)]
    pub poll_interval_us: u64,
    /// Simulated frame source settings
    #[serde(default)]
    pub simulated: SimulatedGrabberConfig,
}

/// Simulated frame source configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulatedGrabberConfig {
    /// Frame width in pixels
    #[serde(default = "default_sim_width")]
    pub width: u32,
    /// Frame height in pixels
    #[serde(default = "default_sim_height")]
    pub height: u32,
    /// Time between simulated frame completions in microseconds
    #[serde(default = "default_sim_frame_interval")]
    pub frame_interval_us: u64,
}

/// Capture ring configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    /// Maximum number of frames a single session may capture
    #[serde(default = "default_max_frames")]
    pub max_frames: usize,
}

/// Output artifact format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Uncompressed 8-bit greyscale AVI
    #[default]
    Avi,
    /// Directory of 8-bit greyscale TIFF images
    Tiff,
}

/// Sequence export configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportConfig {
    /// Directory the artifacts are written into
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// File name prefix (camera name)
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// Playback frame rate written into the AVI header
    #[serde(default = "default_playback_fps")]
    pub playback_fps: f64,
    /// Output format
    #[serde(default)]
    pub format: ExportFormat,
    /// Write a JSON sidecar next to each artifact
    #[serde(default = "default_write_sidecar")]
    pub write_sidecar: bool,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "grabsync".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 51717))
}

fn default_reply_port() -> u16 {
    9090
}

fn default_max_datagram() -> usize {
    512
}

fn default_format_file() -> String {
    "ExTrigger_1024_150_0_05ms.fmt".to_string()
}

fn default_open_attempts() -> u32 {
    2
}

fn default_sim_width() -> u32 {
    1024
}

fn default_sim_height() -> u32 {
    150
}

fn default_sim_frame_interval() -> u64 {
    1_000
}

fn default_max_frames() -> usize {
    30_000
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("captures")
}

fn default_file_prefix() -> String {
    "Mikrotron".to_string()
}

fn default_playback_fps() -> f64 {
    5.0
}

fn default_write_sidecar() -> bool {
    true
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            reply_port: default_reply_port(),
            peer: None,
            max_datagram: default_max_datagram(),
        }
    }
}

impl Default for GrabberConfig {
    fn default() -> Self {
        Self {
            format_file: default_format_file(),
            open_attempts: default_open_attempts(),
            open_backoff_ms: 0,
            stall_timeout_ms: 0,
            poll_interval_us: 0,
            simulated: SimulatedGrabberConfig::default(),
        }
    }
}

impl Default for SimulatedGrabberConfig {
    fn default() -> Self {
        Self {
            width: default_sim_width(),
            height: default_sim_height(),
            frame_interval_us: default_sim_frame_interval(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_frames: default_max_frames(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            playback_fps: default_playback_fps(),
            format: ExportFormat::default(),
            write_sidecar: default_write_sidecar(),
        }
    }
}

impl GrabberConfig {
    /// Stall watchdog timeout, if enabled.
    #[must_use]
    pub fn stall_timeout(&self) -> Option<Duration> {
        (self.stall_timeout_ms > 0).then(|| Duration::from_millis(self.stall_timeout_ms))
    }

    /// Poll sleep interval, if any.
    #[must_use]
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_us > 0).then(|| Duration::from_micros(self.poll_interval_us))
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl GrabSyncConfig {
    /// Load configuration from `config/grabsync.toml` and environment variables.
    ///
    /// A missing file is not an error; the defaults apply.
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the sources cannot be merged or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file is invalid or validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("GRABSYNC_").split("__"))
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    ///
    /// Returns a ConfigError with a descriptive message for any validation failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.control.reply_port == 0 {
            return Err(ConfigError::ValidationError(
                "control.reply_port must be non-zero".to_string(),
            ));
        }

        if self.control.max_datagram == 0 || self.control.max_datagram > MAX_UDP_PAYLOAD {
            return Err(ConfigError::ValidationError(format!(
                "Invalid control.max_datagram {}. Must be 1-{}",
                self.control.max_datagram, MAX_UDP_PAYLOAD
            )));
        }

        if self.grabber.open_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "grabber.open_attempts must be > 0".to_string(),
            ));
        }

        let sim = &self.grabber.simulated;
        if sim.width == 0 || sim.height == 0 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid simulated frame size {}x{}",
                sim.width, sim.height
            )));
        }

        if self.capture.max_frames == 0 {
            return Err(ConfigError::ValidationError(
                "capture.max_frames must be > 0".to_string(),
            ));
        }

        if self.export.file_prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "export.file_prefix cannot be empty".to_string(),
            ));
        }

        if !(self.export.playback_fps.is_finite() && self.export.playback_fps > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid export.playback_fps {}. Must be > 0",
                self.export.playback_fps
            )));
        }

        Ok(())
    }
}
