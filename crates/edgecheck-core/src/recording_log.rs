//! Recording-completion log verification.
//!
//! The recorder appends one block per finished segment to a per-camera,
//! per-day log:
//!
//! ```text
//! {log_root}/{YYYY}/{MM}/{DD}/rtsp_stream{n}_{YYYYMMDD}.log
//!
//! 2026-10-16 10:00:00 - INFO - 영상 저장 완료: <file>    <- marker line
//! 2026-10-16 10:00:00 - INFO -   프레임 수: 4500         <- frame count
//! 2026-10-16 10:00:00 - INFO -   영상 길이: 295.0초      <- duration (s)
//! 2026-10-16 10:00:00 - INFO -   파일 크기: 152.3MB      <- size (MB)
//! ```
//!
//! Only the most recent block is judged: the file is scanned from the end
//! and the first marker line carrying a timestamp wins.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{CameraConfig, LogTolerances};

/// Marker written by the recorder when a segment has been saved.
pub const COMPLETION_MARKER: &str = "영상 저장 완료:";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})").expect("valid regex"));
static FRAME_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"프레임 수:\s*(\d+)").expect("valid regex"));
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"영상 길이:\s*([\d.]+)초").expect("valid regex"));
static FILE_SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"파일 크기:\s*([\d.]+)MB").expect("valid regex"));

/// The most recent completed recording found in a camera's log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingLogEntry {
    pub log_timestamp: NaiveDateTime,
    pub frame_count: Option<u64>,
    pub duration_seconds: Option<f64>,
    pub file_size_mb: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogStatus {
    Pass,
    Fail,
    /// No log file in the search window: absence of evidence.
    Skip,
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogStatus::Pass => write!(f, "PASS"),
            LogStatus::Fail => write!(f, "FAIL"),
            LogStatus::Skip => write!(f, "SKIP"),
        }
    }
}

/// Outcome of verifying one camera's recording log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogCheckResult {
    pub status: LogStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<RecordingLogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
}

impl LogCheckResult {
    fn skip() -> Self {
        Self {
            status: LogStatus::Skip,
            log_file: None,
            details: None,
            fail_reason: None,
        }
    }

    fn fail(log_file: &Path, details: Option<RecordingLogEntry>, reason: impl Into<String>) -> Self {
        Self {
            status: LogStatus::Fail,
            log_file: Some(log_file.to_path_buf()),
            details,
            fail_reason: Some(reason.into()),
        }
    }

    fn pass(log_file: &Path, details: RecordingLogEntry) -> Self {
        Self {
            status: LogStatus::Pass,
            log_file: Some(log_file.to_path_buf()),
            details: Some(details),
            fail_reason: None,
        }
    }
}

/// Expected log path for `camera` on `date`.
pub fn log_file_path(log_root: &Path, camera: u32, date: NaiveDate) -> PathBuf {
    log_root
        .join(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
        .join(format!("{:02}", date.day()))
        .join(format!("rtsp_stream{camera}_{}.log", date.format("%Y%m%d")))
}

/// Finds the log closest to `today`, looking back `search_days` days.
pub fn find_latest_log_file(
    log_root: &Path,
    camera: u32,
    today: NaiveDate,
    search_days: u32,
) -> Option<PathBuf> {
    (0..=i64::from(search_days))
        .filter_map(|days_ago| today.checked_sub_signed(Duration::days(days_ago)))
        .map(|date| log_file_path(log_root, camera, date))
        .find(|path| path.is_file())
}

/// Extracts the most recent completion block from log content.
///
/// Marker lines without a leading timestamp are passed over. A timestamp
/// that looks right but is not a real date is a parse error.
pub fn parse_latest_entry(content: &str) -> Result<Option<RecordingLogEntry>, chrono::ParseError> {
    let lines: Vec<&str> = content.lines().collect();

    for (index, line) in lines.iter().enumerate().rev() {
        if !line.contains(COMPLETION_MARKER) {
            continue;
        }
        let Some(captures) = TIMESTAMP_RE.captures(line) else {
            continue;
        };
        let log_timestamp = NaiveDateTime::parse_from_str(&captures[1], TIMESTAMP_FORMAT)?;

        let field = |offset: usize, re: &Regex| -> Option<String> {
            let line = lines.get(index + offset)?;
            re.captures(line).map(|c| c[1].to_string())
        };

        return Ok(Some(RecordingLogEntry {
            log_timestamp,
            frame_count: field(1, &FRAME_COUNT_RE).and_then(|v| v.parse().ok()),
            duration_seconds: field(2, &DURATION_RE).and_then(|v| v.parse().ok()),
            file_size_mb: field(3, &FILE_SIZE_RE).and_then(|v| v.parse().ok()),
        }));
    }

    Ok(None)
}

/// Verifies that a camera's recorder completed a plausible segment recently.
#[derive(Debug, Clone)]
pub struct RecordingLogVerifier {
    log_root: PathBuf,
    search_days: u32,
    tolerances: LogTolerances,
}

impl RecordingLogVerifier {
    pub fn new(log_root: impl Into<PathBuf>) -> Self {
        Self {
            log_root: log_root.into(),
            search_days: 1,
            tolerances: LogTolerances::default(),
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            log_root: config.log_root.clone(),
            search_days: config.log_search_days,
            tolerances: config.log_tolerances.clone(),
        }
    }

    pub fn with_tolerances(mut self, tolerances: LogTolerances) -> Self {
        self.tolerances = tolerances;
        self
    }

    pub fn verify(&self, camera: u32) -> LogCheckResult {
        self.verify_at(camera, Local::now().naive_local())
    }

    /// Verifies against an explicit local "now".
    pub fn verify_at(&self, camera: u32, now: NaiveDateTime) -> LogCheckResult {
        let Some(log_file) =
            find_latest_log_file(&self.log_root, camera, now.date(), self.search_days)
        else {
            warn!(
                camera,
                log_root = %self.log_root.display(),
                search_days = self.search_days,
                "No recording log in search window"
            );
            return LogCheckResult::skip();
        };
        debug!(camera, path = %log_file.display(), "Found recording log");

        let content = match std::fs::read_to_string(&log_file) {
            Ok(content) => content,
            Err(err) => {
                warn!(camera, path = %log_file.display(), error = %err, "Failed to read recording log");
                return LogCheckResult::fail(&log_file, None, format!("failed to read log: {err}"));
            }
        };

        let entry = match parse_latest_entry(&content) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                warn!(camera, path = %log_file.display(), "No completion record in log");
                return LogCheckResult::fail(&log_file, None, "no completion record");
            }
            Err(err) => {
                return LogCheckResult::fail(
                    &log_file,
                    None,
                    format!("failed to parse log timestamp: {err}"),
                );
            }
        };

        match self.validate(&entry, now) {
            Ok(()) => {
                info!(camera, timestamp = %entry.log_timestamp, "Recording log verified");
                LogCheckResult::pass(&log_file, entry)
            }
            Err(reason) => {
                warn!(camera, reason = %reason, "Recording log rejected");
                LogCheckResult::fail(&log_file, Some(entry), reason)
            }
        }
    }

    /// Checks recency, then frame count, then duration; first violation wins.
    fn validate(&self, entry: &RecordingLogEntry, now: NaiveDateTime) -> Result<(), String> {
        let limits = &self.tolerances;

        let age_minutes = (now - entry.log_timestamp).num_milliseconds() as f64 / 60_000.0;
        if age_minutes > limits.max_age_minutes {
            return Err(format!(
                "log is {age_minutes:.1} minutes old (limit {} minutes)",
                limits.max_age_minutes
            ));
        }

        let Some(frames) = entry.frame_count else {
            return Err("frame count missing".to_string());
        };
        if !(limits.min_frame_count..=limits.max_frame_count).contains(&frames) {
            return Err(format!(
                "frame count out of range: {frames} (expected {}-{})",
                limits.min_frame_count, limits.max_frame_count
            ));
        }

        let Some(duration) = entry.duration_seconds else {
            return Err("video duration missing".to_string());
        };
        if !(limits.min_duration_secs..=limits.max_duration_secs).contains(&duration) {
            return Err(format!(
                "video duration out of range: {duration:.1}s (expected {}-{}s)",
                limits.min_duration_secs, limits.max_duration_secs
            ));
        }

        Ok(())
    }
}
