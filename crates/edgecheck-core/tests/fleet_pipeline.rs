//! End-to-end runs of the camera fleet pipeline over a temporary
//! log and video tree, with scripted probing and adjudication.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Local};
use edgecheck_core::testing::{
    ScriptedAdjudicator, ScriptedProber, write_artifact, write_recording_log,
};
use edgecheck_core::{
    CameraConfig, CameraFleetCheck, CameraStatus, CheckContext, CheckDetails, CheckRegistry,
    CheckStatus, ConsoleOperator, FailCause, FleetOrchestrator, FleetStatus,
    InteractiveAdjudicator, LogStatus, ProgressEvent, Stage, StreamKind, StreamProbeResult,
    SuiteConfig, SuiteRunner, Verdict, generate_targets,
};
use tempfile::TempDir;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

struct Site {
    _dir: TempDir,
    config: CameraConfig,
}

impl Site {
    fn new(cameras: u32) -> Self {
        let dir = TempDir::new().unwrap();
        let config = CameraConfig {
            camera_count: cameras,
            log_root: dir.path().join("logs"),
            artifact_root: dir.path().join("cam"),
            ..CameraConfig::default()
        };
        Self { _dir: dir, config }
    }

    /// Healthy log and a fresh video file for `camera`.
    fn healthy(&self, camera: u32) -> &Self {
        self.log(camera, 2, 4500);
        self.video(camera);
        self
    }

    fn log(&self, camera: u32, minutes_ago: i64, frames: u64) {
        let at = Local::now().naive_local() - Duration::minutes(minutes_ago);
        write_recording_log(&self.config.log_root, camera, at, frames, 295.0).unwrap();
    }

    fn video(&self, camera: u32) {
        let modified = Local::now() - Duration::minutes(1);
        write_artifact(&self.config.artifact_root, camera, modified).unwrap();
    }

    fn fleet(&self, prober: &ScriptedProber, adjudicator: &ScriptedAdjudicator) -> FleetOrchestrator {
        FleetOrchestrator::new(
            &self.config,
            Arc::new(prober.clone()),
            Box::new(adjudicator.clone()),
        )
    }
}

#[tokio::test]
async fn test_healthy_fleet_passes() {
    let site = Site::new(3);
    for camera in 1..=3 {
        site.healthy(camera);
    }

    let result = site
        .fleet(&ScriptedProber::new(), &ScriptedAdjudicator::automatic())
        .run()
        .await;

    assert_eq!(result.status, FleetStatus::Pass);
    assert_eq!(result.pass_count, 3);
    assert!(result.fail_causes.is_empty());
    let artifacts = result.video_artifacts.unwrap();
    assert_eq!(artifacts.found_cameras(), BTreeSet::from([1, 2, 3]));
}

#[tokio::test]
async fn test_missing_video_overrides_passing_cameras() {
    let site = Site::new(3);
    site.healthy(1).healthy(2);
    site.log(3, 2, 4500);

    let result = site
        .fleet(&ScriptedProber::new(), &ScriptedAdjudicator::automatic())
        .run()
        .await;

    assert_eq!(result.pass_count, 3);
    assert_eq!(result.fail_count, 0);
    assert_eq!(result.status, FleetStatus::Fail);
    let artifacts = result.video_artifacts.unwrap();
    assert_eq!(artifacts.missing_cameras, BTreeSet::from([3]));
    assert_eq!(
        result.fail_causes,
        vec![FailCause::MissingArtifacts {
            cameras: BTreeSet::from([3])
        }]
    );
}

#[tokio::test]
async fn test_source_failure_still_probes_re_stream() {
    let site = Site::new(1);
    site.healthy(1);
    let target = generate_targets(&site.config).remove(0);
    let prober = ScriptedProber::new().with_result(
        &target.source_endpoint,
        StreamProbeResult::failed("failed to open stream: Connection refused"),
    );
    let adjudicator = ScriptedAdjudicator::automatic();

    let result = site.fleet(&prober, &adjudicator).run().await;

    let camera = &result.cameras[0];
    assert_eq!(camera.source_status, Verdict::Fail);
    assert_eq!(camera.re_stream_status, Some(Verdict::Pass));
    assert_eq!(camera.overall, CameraStatus::Fail);
    assert_eq!(
        adjudicator
            .records()
            .iter()
            .map(|r| r.kind)
            .collect::<Vec<_>>(),
        vec![StreamKind::Source, StreamKind::ReStream]
    );
    assert_eq!(result.status, FleetStatus::Fail);
    assert_eq!(result.fail_causes, vec![FailCause::CameraFailures { count: 1 }]);
}

#[tokio::test]
async fn test_stale_and_out_of_range_logs_fail_cameras() {
    let site = Site::new(2);
    site.log(1, 15, 4500);
    site.log(2, 2, 4300);
    site.video(1);
    site.video(2);

    let result = site
        .fleet(&ScriptedProber::new(), &ScriptedAdjudicator::automatic())
        .run()
        .await;

    let stale = result.cameras[0].log_status.as_ref().unwrap();
    assert_eq!(stale.status, LogStatus::Fail);
    assert!(stale.fail_reason.as_deref().unwrap().contains("minutes old"));

    let frames = result.cameras[1].log_status.as_ref().unwrap();
    assert!(frames
        .fail_reason
        .as_deref()
        .unwrap()
        .starts_with("frame count out of range"));

    assert_eq!(result.fail_count, 2);
    assert_eq!(result.cameras[0].fail_reasons, vec!["log: FAIL".to_string()]);
}

#[tokio::test]
async fn test_missing_logs_are_skipped_not_failed() {
    let site = Site::new(1);
    site.video(1);

    let result = site
        .fleet(&ScriptedProber::new(), &ScriptedAdjudicator::automatic())
        .run()
        .await;

    let log = result.cameras[0].log_status.as_ref().unwrap();
    assert_eq!(log.status, LogStatus::Skip);
    assert!(log.fail_reason.is_none());
}

#[tokio::test]
async fn test_quit_at_second_camera_stops_the_fleet() {
    let site = Site::new(4);
    for camera in 1..=4 {
        site.healthy(camera);
    }
    let prober = ScriptedProber::new();
    let adjudicator = ScriptedAdjudicator::new(vec![Verdict::Pass, Verdict::Pass, Verdict::Quit]);
    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stages);

    let result = site
        .fleet(&prober, &adjudicator)
        .on_progress(Box::new(move |event| {
            if let ProgressEvent::StageStarted { stage, .. } = event {
                sink.lock().unwrap().push(stage);
            }
        }))
        .run()
        .await;

    assert_eq!(result.status, FleetStatus::Quit);
    assert_eq!(result.cameras.len(), 2);
    assert_eq!(result.cameras[0].overall, CameraStatus::Pass);
    assert_eq!(result.cameras[1].overall, CameraStatus::Skip);
    assert!(result.video_artifacts.is_none());
    assert!(!stages.lock().unwrap().contains(&Stage::VideoArtifacts));
    assert_eq!(adjudicator.adjudication_count(), 3);
}

#[tokio::test]
async fn test_cancelled_interactive_run_quits_on_unreachable_cameras() {
    let site = Site::new(3);
    let targets = generate_targets(&site.config);
    let mut prober = ScriptedProber::new();
    for target in &targets {
        prober = prober
            .with_result(&target.source_endpoint, StreamProbeResult::failed("refused"))
            .with_result(&target.re_stream_endpoint, StreamProbeResult::failed("refused"));
    }
    let cancel = CancellationToken::new();
    cancel.cancel();
    let operator = ConsoleOperator::new(BufReader::new(&b""[..])).with_output(Vec::new());
    let adjudicator =
        InteractiveAdjudicator::new(Box::new(operator), std::time::Duration::from_secs(1))
            .with_cancellation(cancel);

    let result = FleetOrchestrator::new(
        &site.config,
        Arc::new(prober.clone()),
        Box::new(adjudicator),
    )
    .run()
    .await;

    assert_eq!(result.status, FleetStatus::Quit);
    assert_eq!(result.cameras.len(), 1);
    assert_eq!(result.cameras[0].overall, CameraStatus::Skip);
    assert_eq!(result.fail_count, 0);
    assert_eq!(prober.probe_count(), 1);
}

#[tokio::test]
async fn test_operator_skip_marks_camera_skipped() {
    let site = Site::new(2);
    site.healthy(1).healthy(2);
    let adjudicator = ScriptedAdjudicator::new(vec![Verdict::Skip, Verdict::Pass]);

    let result = site.fleet(&ScriptedProber::new(), &adjudicator).run().await;

    assert_eq!(result.cameras[0].overall, CameraStatus::Skip);
    assert_eq!(result.skip_count, 1);
    assert_eq!(result.pass_count, 1);
    assert_eq!(result.status, FleetStatus::Pass);
}

#[tokio::test]
async fn test_suite_runner_reports_camera_fleet() {
    let site = Site::new(1);
    site.healthy(1);
    let mut registry = CheckRegistry::new();
    registry.register(
        "camera",
        Box::new(|_: &SuiteConfig, _: &CheckContext| -> Box<dyn edgecheck_core::HealthCheck> {
            Box::new(CameraFleetCheck::with_collaborators(
                Arc::new(ScriptedProber::new()),
                Box::new(ScriptedAdjudicator::automatic()),
            ))
        }),
    );
    let config = SuiteConfig {
        checks: Vec::new(),
        camera: site.config.clone(),
    };

    let report = SuiteRunner::new(registry, CheckContext::default())
        .run(&config, &["camera".to_string()])
        .await
        .unwrap();

    assert_eq!(report.status, CheckStatus::Pass);
    let check = &report.checks[0];
    assert_eq!(check.summary, "1 passed, 0 failed, 0 skipped of 1 camera(s)");
    match &check.details {
        Some(CheckDetails::Cameras(fleet)) => assert_eq!(fleet.status, FleetStatus::Pass),
        other => panic!("expected camera details, got {other:?}"),
    }

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "PASS");
    assert_eq!(json["checks"][0]["details"]["cameras"]["cameras"][0]["overall"], "PASS");
}
