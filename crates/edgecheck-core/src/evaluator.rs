//! Per-camera evaluation: two stream checks and the recording log.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::adjudicator::{Adjudicator, StreamKind, StreamReview, Verdict};
use crate::config::CameraConfig;
use crate::probe::{StreamProbeResult, StreamProber, redact_credentials};
use crate::recording_log::{LogCheckResult, LogStatus, RecordingLogVerifier};
use crate::targets::CameraTarget;

/// Pipeline stages reported through progress notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Source,
    ReStream,
    RecordingLog,
    VideoArtifacts,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Source => write!(f, "source stream"),
            Stage::ReStream => write!(f, "re-stream"),
            Stage::RecordingLog => write!(f, "recording log"),
            Stage::VideoArtifacts => write!(f, "video artifacts"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CameraStatus {
    Pass,
    Fail,
    Skip,
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraStatus::Pass => write!(f, "PASS"),
            CameraStatus::Fail => write!(f, "FAIL"),
            CameraStatus::Skip => write!(f, "SKIP"),
        }
    }
}

/// Everything learned about one camera in one fleet run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraCheckResult {
    pub camera_number: u32,
    pub name: String,
    pub ip_address: String,
    pub re_stream_port: u16,
    pub source_status: Verdict,
    pub source_probe: StreamProbeResult,
    /// Absent when the operator quit during the source check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub re_stream_status: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub re_stream_probe: Option<StreamProbeResult>,
    /// Absent when the operator quit during a stream check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_status: Option<LogCheckResult>,
    pub overall: CameraStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fail_reasons: Vec<String>,
}

impl CameraCheckResult {
    /// True when the operator asked to stop the whole run at this camera.
    pub fn is_quit(&self) -> bool {
        self.source_status == Verdict::Quit || self.re_stream_status == Some(Verdict::Quit)
    }
}

/// Combines the three per-camera dimensions into one status.
///
/// An operator skip on either stream wins over everything else. A camera
/// aborted by quit is reported as skipped, never failed.
pub fn overall_status(
    source: Verdict,
    re_stream: Option<Verdict>,
    log: Option<&LogCheckResult>,
) -> CameraStatus {
    let streams = [Some(source), re_stream];
    if streams.contains(&Some(Verdict::Quit)) || streams.contains(&Some(Verdict::Skip)) {
        return CameraStatus::Skip;
    }

    let log_pass = log.is_some_and(|log| log.status == LogStatus::Pass);
    if source == Verdict::Pass && re_stream == Some(Verdict::Pass) && log_pass {
        CameraStatus::Pass
    } else {
        CameraStatus::Fail
    }
}

fn fail_reasons(result: &CameraCheckResult) -> Vec<String> {
    let mut reasons = Vec::new();
    if result.source_status != Verdict::Pass {
        reasons.push(format!("source: {}", result.source_status));
    }
    if let Some(status) = result.re_stream_status.filter(|s| *s != Verdict::Pass) {
        reasons.push(format!("re-stream: {status}"));
    }
    if let Some(log) = result.log_status.as_ref().filter(|l| l.status != LogStatus::Pass) {
        reasons.push(format!("log: {}", log.status));
    }
    reasons
}

/// Runs source, re-stream and log checks for one camera, in that order.
pub struct CameraEvaluator {
    prober: Arc<dyn StreamProber>,
    adjudicator: Box<dyn Adjudicator>,
    log_verifier: RecordingLogVerifier,
    probe_timeout: Duration,
    source_port: u16,
}

impl CameraEvaluator {
    pub fn new(
        config: &CameraConfig,
        prober: Arc<dyn StreamProber>,
        adjudicator: Box<dyn Adjudicator>,
    ) -> Self {
        Self {
            prober,
            adjudicator,
            log_verifier: RecordingLogVerifier::from_config(config),
            probe_timeout: config.probe_timeout(),
            source_port: config.source_port,
        }
    }

    /// Evaluates `target`, calling `on_stage` as each stage begins.
    ///
    /// Stream failures never stop the camera: the re-stream is checked
    /// after a failed source and the log is always read. Only a quit ends
    /// the evaluation early.
    pub async fn evaluate(
        &mut self,
        target: &CameraTarget,
        on_stage: &mut (dyn FnMut(Stage) + Send),
    ) -> CameraCheckResult {
        let camera = target.camera_number;
        info!(camera, ip = %target.ip_address, "Evaluating camera");

        on_stage(Stage::Source);
        let (source_probe, source_status) = self.check_stream(target, StreamKind::Source).await;
        let mut result = CameraCheckResult {
            camera_number: camera,
            name: target.name(),
            ip_address: target.ip_address.clone(),
            re_stream_port: target.re_stream_port,
            source_status,
            source_probe,
            re_stream_status: None,
            re_stream_probe: None,
            log_status: None,
            overall: CameraStatus::Fail,
            fail_reasons: Vec::new(),
        };

        if source_status != Verdict::Quit {
            on_stage(Stage::ReStream);
            let (probe, verdict) = self.check_stream(target, StreamKind::ReStream).await;
            result.re_stream_probe = Some(probe);
            result.re_stream_status = Some(verdict);
        }

        if result.is_quit() {
            warn!(camera, "Operator quit, camera evaluation aborted");
        } else {
            on_stage(Stage::RecordingLog);
            result.log_status = Some(self.log_verifier.verify(camera));
        }

        result.overall = overall_status(
            result.source_status,
            result.re_stream_status,
            result.log_status.as_ref(),
        );
        if result.overall == CameraStatus::Fail {
            result.fail_reasons = fail_reasons(&result);
            warn!(camera, reasons = ?result.fail_reasons, "Camera failed");
        } else {
            info!(camera, overall = %result.overall, "Camera evaluated");
        }
        result
    }

    async fn check_stream(
        &mut self,
        target: &CameraTarget,
        kind: StreamKind,
    ) -> (StreamProbeResult, Verdict) {
        let review = StreamReview::for_target(target, kind, self.source_port);
        info!(
            camera = review.camera_number,
            stream = %kind,
            url = %redact_credentials(&review.endpoint),
            "Probing stream"
        );

        let probe = self.prober.probe(&review.endpoint, self.probe_timeout).await;
        if let Some(error) = probe.error() {
            warn!(camera = review.camera_number, stream = %kind, error, "Stream probe failed");
        }

        let verdict = self.adjudicator.adjudicate(&review, &probe).await;
        info!(camera = review.camera_number, stream = %kind, verdict = %verdict, "Stream adjudicated");
        (probe, verdict)
    }
}
