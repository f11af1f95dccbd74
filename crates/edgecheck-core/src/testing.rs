//! Scripted collaborators and fixture writers for deterministic tests.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime};

use crate::adjudicator::{Adjudicator, StreamKind, StreamReview, Verdict};
use crate::artifacts::hour_dir;
use crate::probe::{StreamProbeResult, StreamProber};
use crate::recording_log::{COMPLETION_MARKER, log_file_path};

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Prober returning per-endpoint scripted results.
///
/// Endpoints without a scripted result connect at 1920x1080. Clones share
/// state, so a test can keep a handle while the pipeline owns another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProber {
    state: Arc<Mutex<ProberState>>,
}

#[derive(Debug, Default)]
struct ProberState {
    results: HashMap<String, StreamProbeResult>,
    probed: Vec<String>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, endpoint: &str, result: StreamProbeResult) -> Self {
        lock(&self.state).results.insert(endpoint.to_string(), result);
        self
    }

    /// Endpoints probed so far, in call order.
    pub fn probed_endpoints(&self) -> Vec<String> {
        lock(&self.state).probed.clone()
    }

    pub fn probe_count(&self) -> usize {
        lock(&self.state).probed.len()
    }
}

#[async_trait]
impl StreamProber for ScriptedProber {
    async fn probe(&self, endpoint: &str, _timeout: Duration) -> StreamProbeResult {
        let mut state = lock(&self.state);
        state.probed.push(endpoint.to_string());
        state
            .results
            .get(endpoint)
            .cloned()
            .unwrap_or_else(|| StreamProbeResult::connected(1920, 1080))
    }
}

/// Record of one adjudication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjudicationRecord {
    pub camera_number: u32,
    pub kind: StreamKind,
    pub probe_success: bool,
    pub verdict: Verdict,
}

/// Adjudicator that replays scripted verdicts in order.
///
/// Once the script runs out it behaves like the automatic adjudicator.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAdjudicator {
    state: Arc<Mutex<AdjudicatorState>>,
}

#[derive(Debug, Default)]
struct AdjudicatorState {
    verdicts: Vec<Verdict>,
    current: usize,
    records: Vec<AdjudicationRecord>,
}

impl ScriptedAdjudicator {
    pub fn new(verdicts: Vec<Verdict>) -> Self {
        Self {
            state: Arc::new(Mutex::new(AdjudicatorState {
                verdicts,
                ..AdjudicatorState::default()
            })),
        }
    }

    pub fn automatic() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AdjudicationRecord> {
        lock(&self.state).records.clone()
    }

    pub fn adjudication_count(&self) -> usize {
        lock(&self.state).records.len()
    }
}

#[async_trait]
impl Adjudicator for ScriptedAdjudicator {
    async fn adjudicate(&mut self, review: &StreamReview, probe: &StreamProbeResult) -> Verdict {
        let mut state = lock(&self.state);
        let verdict = match state.verdicts.get(state.current) {
            Some(verdict) => *verdict,
            None if probe.is_success() => Verdict::Pass,
            None => Verdict::Fail,
        };
        state.current += 1;
        state.records.push(AdjudicationRecord {
            camera_number: review.camera_number,
            kind: review.kind,
            probe_success: probe.is_success(),
            verdict,
        });
        verdict
    }
}

/// Appends a recording-completion block to a camera's log for `at`'s date.
pub fn write_recording_log(
    log_root: &Path,
    camera: u32,
    at: NaiveDateTime,
    frame_count: u64,
    duration_secs: f64,
) -> std::io::Result<PathBuf> {
    let path = log_file_path(log_root, camera, at.date());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let stamp = at.format("%Y-%m-%d %H:%M:%S");
    let mut file = File::options().create(true).append(true).open(&path)?;
    writeln!(file, "{stamp} - INFO - {COMPLETION_MARKER} rtsp_stream{camera}.mp4")?;
    writeln!(file, "{stamp} - INFO -   프레임 수: {frame_count}")?;
    writeln!(file, "{stamp} - INFO -   영상 길이: {duration_secs:.1}초")?;
    writeln!(file, "{stamp} - INFO -   파일 크기: 152.3MB")?;
    Ok(path)
}

/// Creates an empty video file for `camera` in the hour bucket of `modified`.
pub fn write_artifact(
    artifact_root: &Path,
    camera: u32,
    modified: DateTime<Local>,
) -> std::io::Result<PathBuf> {
    let dir = hour_dir(artifact_root, modified);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!(
        "{}_stream0{camera}_0.mp4",
        modified.format("%Y%m%d_%H%M%S")
    ));
    let file = File::create(&path)?;
    file.set_modified(SystemTime::from(modified))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording_log::parse_latest_entry;

    fn review(kind: StreamKind) -> StreamReview {
        StreamReview {
            camera_number: 1,
            kind,
            endpoint: "rtsp://127.0.0.1:1111/live".to_string(),
            address: "port 1111".to_string(),
        }
    }

    #[tokio::test]
    async fn test_scripted_prober_defaults_and_overrides() {
        let prober = ScriptedProber::new().with_result("rtsp://bad", StreamProbeResult::failed("x"));

        let ok = prober.probe("rtsp://good", Duration::from_secs(1)).await;
        let bad = prober.probe("rtsp://bad", Duration::from_secs(1)).await;

        assert!(ok.is_success());
        assert_eq!(bad.error(), Some("x"));
        assert_eq!(prober.probed_endpoints(), vec!["rtsp://good", "rtsp://bad"]);
    }

    #[tokio::test]
    async fn test_scripted_adjudicator_replays_then_automatic() {
        let mut adjudicator = ScriptedAdjudicator::new(vec![Verdict::Skip]);
        let handle = adjudicator.clone();
        let ok = StreamProbeResult::connected(640, 480);
        let bad = StreamProbeResult::failed("refused");

        assert_eq!(adjudicator.adjudicate(&review(StreamKind::Source), &ok).await, Verdict::Skip);
        assert_eq!(adjudicator.adjudicate(&review(StreamKind::ReStream), &ok).await, Verdict::Pass);
        assert_eq!(adjudicator.adjudicate(&review(StreamKind::Source), &bad).await, Verdict::Fail);

        assert_eq!(handle.adjudication_count(), 3);
        assert!(!handle.records()[2].probe_success);
    }

    #[test]
    fn test_written_log_parses() {
        let dir = tempfile::TempDir::new().unwrap();
        let at = NaiveDateTime::parse_from_str("2026-10-16 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();

        let path = write_recording_log(dir.path(), 2, at, 4500, 295.0).unwrap();
        let entry = parse_latest_entry(&std::fs::read_to_string(path).unwrap())
            .unwrap()
            .unwrap();

        assert_eq!(entry.log_timestamp, at);
        assert_eq!(entry.frame_count, Some(4500));
        assert_eq!(entry.file_size_mb, Some(152.3));
    }
}
