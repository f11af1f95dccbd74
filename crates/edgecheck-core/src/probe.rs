//! Live stream probing.
//!
//! A probe opens a short-lived client connection to one stream endpoint,
//! reads exactly one frame and reports its dimensions. The prober does not
//! care whether the endpoint is a camera source or a re-stream relay.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ProbeError;

/// Outcome of one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StreamProbeResult {
    Connected { width: u32, height: u32 },
    Failed { error: String },
}

impl StreamProbeResult {
    pub fn connected(width: u32, height: u32) -> Self {
        Self::Connected { width, height }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Frame dimensions, present only on success.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        match self {
            Self::Connected { width, height } => Some((*width, *height)),
            Self::Failed { .. } => None,
        }
    }

    /// Diagnostic message, present only on failure.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Connected { .. } => None,
            Self::Failed { error } => Some(error),
        }
    }
}

/// Opens a stream endpoint and reads one frame within `timeout`.
///
/// `timeout` applies to the open and to the read alike. Implementations
/// must release the connection on every exit path and never panic; any
/// failure is reported as [`StreamProbeResult::Failed`].
#[async_trait]
pub trait StreamProber: Send + Sync {
    async fn probe(&self, endpoint: &str, timeout: Duration) -> StreamProbeResult;
}

/// Probes RTSP endpoints by running `ffprobe` for a single video frame.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: String,
    rtsp_transport: String,
}

impl FfprobeProber {
    pub fn new(rtsp_transport: impl Into<String>) -> Self {
        Self {
            program: "ffprobe".to_string(),
            rtsp_transport: rtsp_transport.into(),
        }
    }

    /// Uses a different ffprobe binary (e.g. a bundled build).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, endpoint: &str, timeout: Duration) -> Command {
        let socket_timeout_us = timeout.as_micros().to_string();
        let mut command = Command::new(&self.program);
        command
            .args([
                "-v",
                "error",
                "-rtsp_transport",
                &self.rtsp_transport,
                "-timeout",
                &socket_timeout_us,
                "-select_streams",
                "v:0",
                "-read_intervals",
                "%+#1",
                "-show_entries",
                "frame=width,height",
                "-of",
                "json",
                endpoint,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the child on timeout must also drop the connection.
            .kill_on_drop(true);
        command
    }

    async fn run(&self, endpoint: &str, timeout: Duration) -> Result<StreamProbeResult, ProbeError> {
        let child = self
            .command(endpoint, timeout)
            .spawn()
            .map_err(|source| ProbeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Open and read are bounded separately by the socket timeout; the
        // process as a whole gets both budgets.
        let deadline = timeout.saturating_mul(2);
        let output = match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    url = %redact_credentials(endpoint),
                    timeout_secs = timeout.as_secs(),
                    "ffprobe timed out, process killed"
                );
                return Ok(StreamProbeResult::failed(format!(
                    "probe timed out after {}s",
                    deadline.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .map_or_else(|| output.status.to_string(), |line| line.trim().to_string());
            return Ok(StreamProbeResult::failed(format!(
                "failed to open stream: {detail}"
            )));
        }

        parse_ffprobe_output(&output.stdout)
    }
}

#[async_trait]
impl StreamProber for FfprobeProber {
    async fn probe(&self, endpoint: &str, timeout: Duration) -> StreamProbeResult {
        debug!(url = %redact_credentials(endpoint), "Probing stream");
        match self.run(endpoint, timeout).await {
            Ok(result) => result,
            Err(err) => StreamProbeResult::failed(err.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    frames: Vec<FfprobeFrame>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFrame {
    width: Option<u32>,
    height: Option<u32>,
}

/// Interprets ffprobe's JSON report of the first decoded frame.
pub(crate) fn parse_ffprobe_output(stdout: &[u8]) -> Result<StreamProbeResult, ProbeError> {
    let output: FfprobeOutput = serde_json::from_slice(stdout)?;
    let frame = output
        .frames
        .iter()
        .find_map(|frame| Some((frame.width?, frame.height?)));

    Ok(match frame {
        Some((width, height)) if width > 0 && height > 0 => {
            StreamProbeResult::connected(width, height)
        }
        _ => StreamProbeResult::failed("failed to read frame"),
    })
}

/// Masks the `user:password@` part of a stream URL for logging.
pub fn redact_credentials(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{scheme}://***@{}", &rest[at + 1..]),
        None => url.to_string(),
    }
}
