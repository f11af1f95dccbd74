//! Suite configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! the `CAMERA_*` environment variables the deployed units already export.
//! CLI flags are applied last by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Top-level configuration handed to the suite runner and every check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Checks to run, in registry order. Empty means every registered check.
    pub checks: Vec<String>,

    pub camera: CameraConfig,
}

impl SuiteConfig {
    /// Parses a YAML configuration file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse_yaml(&content)
    }

    /// Parses configuration from a YAML string.
    pub fn parse_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Loads defaults or the given file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration file");
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        config
            .camera
            .apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }
}

/// Addressing, evidence locations and tolerances for the camera fleet check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub camera_count: u32,
    /// First three octets of the camera subnet, e.g. `192.168.1`.
    pub base_ip: String,
    pub start_octet: u32,
    pub username: String,
    pub password: String,
    pub stream_path: String,
    pub source_port: u16,
    pub re_stream_host: String,
    pub re_stream_base_port: u16,
    pub re_stream_path: String,
    /// RTSP lower transport handed to ffprobe/ffplay (`udp` or `tcp`).
    pub rtsp_transport: String,
    pub log_root: PathBuf,
    pub artifact_root: PathBuf,
    pub probe_timeout_secs: u64,
    pub display_budget_secs: u64,
    /// Days searched before today; 1 means today and yesterday.
    pub log_search_days: u32,
    pub artifact_window_minutes: i64,
    pub auto_mode: bool,
    pub log_tolerances: LogTolerances,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            camera_count: 4,
            base_ip: "192.168.1".to_string(),
            start_octet: 101,
            username: "root".to_string(),
            password: "root".to_string(),
            stream_path: "cam0_0".to_string(),
            source_port: 554,
            re_stream_host: "127.0.0.1".to_string(),
            re_stream_base_port: 1111,
            re_stream_path: "live".to_string(),
            rtsp_transport: "udp".to_string(),
            log_root: PathBuf::from("/mnt/nas/logs"),
            artifact_root: PathBuf::from("/mnt/nas/cam"),
            probe_timeout_secs: 10,
            display_budget_secs: 10,
            log_search_days: 1,
            artifact_window_minutes: 10,
            auto_mode: true,
            log_tolerances: LogTolerances::default(),
        }
    }
}

impl CameraConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn display_budget(&self) -> Duration {
        Duration::from_secs(self.display_budget_secs)
    }

    /// Applies `CAMERA_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CAMERA_BASE_IP") {
            self.base_ip = value;
        }
        if let Some(value) = lookup("CAMERA_START_IP") {
            self.start_octet = parse_env("CAMERA_START_IP", &value)?;
        }
        if let Some(value) = lookup("CAMERA_USER") {
            self.username = value;
        }
        if let Some(value) = lookup("CAMERA_PASS") {
            self.password = value;
        }
        if let Some(value) = lookup("CAMERA_RTSP_PATH") {
            self.stream_path = value;
        }
        if let Some(value) = lookup("CAMERA_RTSP_PORT") {
            self.source_port = parse_env("CAMERA_RTSP_PORT", &value)?;
        }
        if let Some(value) = lookup("CAMERA_MEDIAMTX_BASE_PORT") {
            self.re_stream_base_port = parse_env("CAMERA_MEDIAMTX_BASE_PORT", &value)?;
        }
        if let Some(value) = lookup("CAMERA_LOG_BASE_PATH") {
            self.log_root = PathBuf::from(value);
        }
        if let Some(value) = lookup("CAMERA_VIDEO_BASE_PATH") {
            self.artifact_root = PathBuf::from(value);
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Acceptance limits for the most recent recording-completion log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogTolerances {
    pub max_age_minutes: f64,
    pub min_frame_count: u64,
    pub max_frame_count: u64,
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
}

impl Default for LogTolerances {
    fn default() -> Self {
        Self {
            max_age_minutes: 10.0,
            min_frame_count: 4400,
            max_frame_count: 4600,
            min_duration_secs: 280.0,
            max_duration_secs: 310.0,
        }
    }
}
