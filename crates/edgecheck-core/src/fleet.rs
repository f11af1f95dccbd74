//! Fleet orchestration: every camera in order, then the artifact sweep.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::adjudicator::Adjudicator;
use crate::artifacts::{VideoArtifactResult, VideoArtifactVerifier};
use crate::config::CameraConfig;
use crate::evaluator::{CameraCheckResult, CameraEvaluator, CameraStatus, Stage};
use crate::probe::StreamProber;
use crate::targets::{CameraTarget, generate_targets};

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Advisory notifications emitted while a fleet run progresses.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    FleetStarted {
        total: usize,
    },

    /// A stage is about to run. `camera_number` is `None` for the
    /// fleet-wide artifact sweep.
    StageStarted {
        camera_number: Option<u32>,
        stage: Stage,
        percent: u8,
    },

    CameraCompleted {
        result: CameraCheckResult,
        percent: u8,
    },

    FleetCompleted {
        result: FleetCheckResult,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FleetStatus {
    Pass,
    Fail,
    Skip,
    Quit,
}

impl fmt::Display for FleetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetStatus::Pass => write!(f, "PASS"),
            FleetStatus::Fail => write!(f, "FAIL"),
            FleetStatus::Skip => write!(f, "SKIP"),
            FleetStatus::Quit => write!(f, "QUIT"),
        }
    }
}

/// Why a fleet run failed. Both causes may apply at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum FailCause {
    CameraFailures { count: usize },
    MissingArtifacts { cameras: BTreeSet<u32> },
}

impl fmt::Display for FailCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailCause::CameraFailures { count } => write!(f, "{count} camera(s) failed"),
            FailCause::MissingArtifacts { cameras } => {
                let list: Vec<String> = cameras.iter().map(u32::to_string).collect();
                write!(f, "no recent video for camera(s) {}", list.join(", "))
            }
        }
    }
}

/// Result of one fleet run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetCheckResult {
    pub status: FleetStatus,
    pub total: usize,
    pub pass_count: usize,
    pub fail_count: usize,
    pub skip_count: usize,
    pub cameras: Vec<CameraCheckResult>,
    /// Absent when the run was quit before the artifact sweep.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_artifacts: Option<VideoArtifactResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fail_causes: Vec<FailCause>,
}

impl FleetCheckResult {
    fn new(total: usize) -> Self {
        Self {
            status: FleetStatus::Skip,
            total,
            pass_count: 0,
            fail_count: 0,
            skip_count: 0,
            cameras: Vec::with_capacity(total),
            video_artifacts: None,
            fail_causes: Vec::new(),
        }
    }

    fn record(&mut self, camera: CameraCheckResult) {
        match camera.overall {
            CameraStatus::Pass => self.pass_count += 1,
            CameraStatus::Fail => self.fail_count += 1,
            CameraStatus::Skip => self.skip_count += 1,
        }
        self.cameras.push(camera);
    }

    /// Applies the fleet rules once the artifact sweep is in.
    fn conclude(&mut self, artifacts: VideoArtifactResult) {
        if self.fail_count > 0 {
            self.fail_causes.push(FailCause::CameraFailures {
                count: self.fail_count,
            });
        }
        if !artifacts.is_pass() {
            self.fail_causes.push(FailCause::MissingArtifacts {
                cameras: artifacts.missing_cameras.clone(),
            });
        }
        self.video_artifacts = Some(artifacts);

        self.status = if !self.fail_causes.is_empty() {
            FleetStatus::Fail
        } else if self.pass_count > 0 {
            FleetStatus::Pass
        } else {
            FleetStatus::Skip
        };
    }
}

/// Sequentially evaluates a fleet of cameras.
pub struct FleetOrchestrator {
    targets: Vec<CameraTarget>,
    evaluator: CameraEvaluator,
    artifact_verifier: VideoArtifactVerifier,
    on_progress: Option<ProgressCallback>,
}

impl FleetOrchestrator {
    pub fn new(
        config: &CameraConfig,
        prober: Arc<dyn StreamProber>,
        adjudicator: Box<dyn Adjudicator>,
    ) -> Self {
        Self {
            targets: generate_targets(config),
            evaluator: CameraEvaluator::new(config, prober, adjudicator),
            artifact_verifier: VideoArtifactVerifier::from_config(config),
            on_progress: None,
        }
    }

    /// Sets a callback for progress updates.
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    fn emit_progress(&self, event: ProgressEvent) {
        if let Some(ref callback) = self.on_progress {
            callback(event);
        }
    }

    pub fn targets(&self) -> &[CameraTarget] {
        &self.targets
    }

    /// Runs the whole fleet.
    ///
    /// A quit stops the loop at once: the partial result holds only the
    /// cameras evaluated so far and the artifact sweep is not run.
    pub async fn run(&mut self) -> FleetCheckResult {
        let total = self.targets.len();
        // Three stages per camera plus the artifact sweep.
        let units = total * 3 + 1;
        let percent = |done: usize| (done * 100 / units) as u8;

        info!(total, "Starting camera fleet check");
        self.emit_progress(ProgressEvent::FleetStarted { total });

        let mut result = FleetCheckResult::new(total);
        let mut done = 0;

        for (index, target) in self.targets.iter().enumerate() {
            let camera_number = target.camera_number;
            let on_progress = &self.on_progress;
            let mut on_stage = |stage: Stage| {
                if let Some(callback) = on_progress {
                    callback(ProgressEvent::StageStarted {
                        camera_number: Some(camera_number),
                        stage,
                        percent: percent(done),
                    });
                }
                done += 1;
            };

            let camera = self.evaluator.evaluate(target, &mut on_stage).await;
            done = (index + 1) * 3;

            if let Some(callback) = on_progress {
                callback(ProgressEvent::CameraCompleted {
                    result: camera.clone(),
                    percent: percent(done),
                });
            }

            let quit = camera.is_quit();
            result.record(camera);
            if quit {
                warn!(
                    camera = camera_number,
                    evaluated = result.cameras.len(),
                    "Fleet check quit by operator"
                );
                result.status = FleetStatus::Quit;
                self.emit_progress(ProgressEvent::FleetCompleted {
                    result: result.clone(),
                });
                return result;
            }
        }

        self.emit_progress(ProgressEvent::StageStarted {
            camera_number: None,
            stage: Stage::VideoArtifacts,
            percent: percent(done),
        });
        let artifacts = self.artifact_verifier.verify(total as u32);
        result.conclude(artifacts);

        info!(
            status = %result.status,
            pass = result.pass_count,
            fail = result.fail_count,
            skip = result.skip_count,
            "Camera fleet check complete"
        );
        self.emit_progress(ProgressEvent::FleetCompleted {
            result: result.clone(),
        });
        result
    }
}
