//! Check registry and the uniform suite runner.
//!
//! Every verification the suite knows about is a [`HealthCheck`]. Checks are
//! not discovered: a [`CheckRegistry`] maps names to constructors and is
//! handed to the [`SuiteRunner`], which runs the selected checks one after
//! another through [`run_timed`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adjudicator::{
    Adjudicator, AutomaticAdjudicator, ConsoleOperator, InteractiveAdjudicator, ViewerCommand,
};
use crate::config::{CameraConfig, SuiteConfig};
use crate::error::CheckError;
use crate::fleet::{FleetCheckResult, FleetOrchestrator, FleetStatus, ProgressEvent};
use crate::probe::{FfprobeProber, StreamProber};

/// Status of one check, and of the suite as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skip,
    Quit,
    /// The check itself could not run.
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Pass => write!(f, "PASS"),
            CheckStatus::Fail => write!(f, "FAIL"),
            CheckStatus::Skip => write!(f, "SKIP"),
            CheckStatus::Quit => write!(f, "QUIT"),
            CheckStatus::Error => write!(f, "ERROR"),
        }
    }
}

impl From<FleetStatus> for CheckStatus {
    fn from(status: FleetStatus) -> Self {
        match status {
            FleetStatus::Pass => CheckStatus::Pass,
            FleetStatus::Fail => CheckStatus::Fail,
            FleetStatus::Skip => CheckStatus::Skip,
            FleetStatus::Quit => CheckStatus::Quit,
        }
    }
}

/// Check-specific result tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckDetails {
    Cameras(FleetCheckResult),
    /// Free-form details from checks registered by an embedding application.
    Custom(serde_json::Value),
}

/// What a check reports back to the runner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub status: CheckStatus,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<CheckDetails>,
}

impl CheckOutcome {
    pub fn new(status: CheckStatus, summary: impl Into<String>) -> Self {
        Self {
            status,
            summary: summary.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: CheckDetails) -> Self {
        self.details = Some(details);
        self
    }
}

/// One verification the suite can run.
#[async_trait]
pub trait HealthCheck: Send {
    fn name(&self) -> &str;

    async fn evaluate(&mut self, config: &SuiteConfig) -> Result<CheckOutcome, CheckError>;
}

/// Shared progress sink for camera fleet notifications.
pub type SharedProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Run-wide collaborators handed to every check constructor.
#[derive(Clone, Default)]
pub struct CheckContext {
    /// Cancelled when the operator aborts the run (Ctrl-C).
    pub cancel: CancellationToken,
    pub camera_progress: Option<SharedProgressCallback>,
}

impl fmt::Debug for CheckContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckContext")
            .field("cancel", &self.cancel)
            .field("camera_progress", &self.camera_progress.is_some())
            .finish()
    }
}

/// Builds a check for one run.
pub type CheckFactory =
    Box<dyn Fn(&SuiteConfig, &CheckContext) -> Box<dyn HealthCheck> + Send + Sync>;

/// Ordered mapping from check name to constructor.
#[derive(Default)]
pub struct CheckRegistry {
    entries: Vec<(String, CheckFactory)>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the checks this crate provides.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            CameraFleetCheck::NAME,
            Box::new(
                |config: &SuiteConfig, context: &CheckContext| -> Box<dyn HealthCheck> {
                    Box::new(CameraFleetCheck::from_config(&config.camera, context))
                },
            ),
        );
        registry
    }

    /// Adds a check, replacing any existing one with the same name.
    pub fn register(&mut self, name: impl Into<String>, factory: CheckFactory) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = factory,
            None => self.entries.push((name, factory)),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Resolves `selected` to registry entries, in registry order.
    ///
    /// An empty selection means every registered check.
    pub fn resolve(&self, selected: &[String]) -> Result<Vec<(&str, &CheckFactory)>, CheckError> {
        let requested: Vec<String> = selected.iter().map(|name| name.to_lowercase()).collect();
        let unknown: Vec<&str> = requested
            .iter()
            .filter(|name| !self.entries.iter().any(|(known, _)| known == *name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(CheckError::UnknownChecks {
                unknown: unknown.join(", "),
                available: self.names().join(", "),
            });
        }

        Ok(self
            .entries
            .iter()
            .filter(|(name, _)| requested.is_empty() || requested.contains(name))
            .map(|(name, factory)| (name.as_str(), factory))
            .collect())
    }
}

impl fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckRegistry")
            .field("checks", &self.names())
            .finish()
    }
}

/// A finished check with timing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    pub name: String,
    pub started_at: DateTime<Local>,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub status: CheckStatus,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<CheckDetails>,
}

fn serialize_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

/// Runs one check with uniform timing, logging and error capture.
///
/// An `Err` from the check becomes an [`CheckStatus::Error`] report; it is
/// never propagated.
pub async fn run_timed(check: &mut dyn HealthCheck, config: &SuiteConfig) -> CheckReport {
    let name = check.name().to_string();
    let started_at = Local::now();
    let start = Instant::now();
    info!(check = %name, "Check started");

    let outcome = match check.evaluate(config).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(check = %name, error = %err, "Check errored");
            CheckOutcome::new(CheckStatus::Error, err.to_string())
        }
    };

    let elapsed = start.elapsed();
    info!(
        check = %name,
        status = %outcome.status,
        elapsed_ms = elapsed.as_millis() as u64,
        "Check finished"
    );

    CheckReport {
        name,
        started_at,
        elapsed,
        status: outcome.status,
        summary: outcome.summary,
        details: outcome.details,
    }
}

/// Folds check statuses into the suite status.
pub fn summarize<I>(statuses: I) -> CheckStatus
where
    I: IntoIterator<Item = CheckStatus>,
{
    let statuses: Vec<CheckStatus> = statuses.into_iter().collect();
    if statuses.is_empty() {
        CheckStatus::Skip
    } else if statuses.contains(&CheckStatus::Quit) {
        CheckStatus::Quit
    } else if statuses
        .iter()
        .any(|s| matches!(s, CheckStatus::Fail | CheckStatus::Error))
    {
        CheckStatus::Fail
    } else if statuses.contains(&CheckStatus::Skip) {
        CheckStatus::Skip
    } else {
        CheckStatus::Pass
    }
}

/// Events emitted by the suite runner.
#[derive(Debug, Clone)]
pub enum SuiteEvent {
    CheckStarted {
        name: String,
        index: usize,
        total: usize,
        percent: u8,
    },
    CheckFinished {
        report: CheckReport,
        percent: u8,
    },
}

pub type SuiteEventCallback = Box<dyn Fn(SuiteEvent) + Send + Sync>;

/// Reports of every check that ran, plus the suite verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteReport {
    pub status: CheckStatus,
    pub checks: Vec<CheckReport>,
}

/// Runs selected checks sequentially, in registry order.
pub struct SuiteRunner {
    registry: CheckRegistry,
    context: CheckContext,
    on_event: Option<SuiteEventCallback>,
}

impl SuiteRunner {
    pub fn new(registry: CheckRegistry, context: CheckContext) -> Self {
        Self {
            registry,
            context,
            on_event: None,
        }
    }

    pub fn on_event(mut self, callback: SuiteEventCallback) -> Self {
        self.on_event = Some(callback);
        self
    }

    fn emit(&self, event: SuiteEvent) {
        if let Some(ref callback) = self.on_event {
            callback(event);
        }
    }

    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    /// Runs `selected` checks, or `config.checks` when `selected` is empty.
    ///
    /// Stops after the first check that reports a quit.
    pub async fn run(
        &self,
        config: &SuiteConfig,
        selected: &[String],
    ) -> Result<SuiteReport, CheckError> {
        let selection = if selected.is_empty() {
            &config.checks
        } else {
            selected
        };
        let checks = self.registry.resolve(selection)?;
        let total = checks.len();
        info!(total, checks = ?checks.iter().map(|(n, _)| *n).collect::<Vec<_>>(), "Starting suite");

        let mut reports = Vec::with_capacity(total);
        for (index, (name, factory)) in checks.into_iter().enumerate() {
            self.emit(SuiteEvent::CheckStarted {
                name: name.to_string(),
                index,
                total,
                percent: (index * 100 / total) as u8,
            });

            let mut check = factory(config, &self.context);
            let report = run_timed(check.as_mut(), config).await;
            let quit = report.status == CheckStatus::Quit;

            self.emit(SuiteEvent::CheckFinished {
                report: report.clone(),
                percent: ((index + 1) * 100 / total) as u8,
            });
            reports.push(report);

            if quit {
                warn!(check = name, "Suite stopped by operator");
                break;
            }
        }

        let status = summarize(reports.iter().map(|report| report.status));
        info!(status = %status, "Suite complete");
        Ok(SuiteReport {
            status,
            checks: reports,
        })
    }
}

/// The camera fleet pipeline as a suite check.
pub struct CameraFleetCheck {
    prober: Arc<dyn StreamProber>,
    adjudicator: Option<Box<dyn Adjudicator>>,
    cancel: CancellationToken,
    on_progress: Option<SharedProgressCallback>,
}

impl CameraFleetCheck {
    pub const NAME: &'static str = "camera";

    /// Uses ffprobe and the adjudication mode selected by `auto_mode`.
    pub fn from_config(config: &CameraConfig, context: &CheckContext) -> Self {
        Self {
            prober: Arc::new(FfprobeProber::new(config.rtsp_transport.clone())),
            adjudicator: None,
            cancel: context.cancel.clone(),
            on_progress: context.camera_progress.clone(),
        }
    }

    /// Uses the given collaborators instead of the configured ones.
    pub fn with_collaborators(
        prober: Arc<dyn StreamProber>,
        adjudicator: Box<dyn Adjudicator>,
    ) -> Self {
        Self {
            prober,
            adjudicator: Some(adjudicator),
            cancel: CancellationToken::new(),
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, callback: SharedProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    fn configured_adjudicator(&self, config: &CameraConfig) -> Box<dyn Adjudicator> {
        if config.auto_mode {
            return Box::new(AutomaticAdjudicator);
        }
        let operator = ConsoleOperator::stdin()
            .with_viewer(ViewerCommand::ffplay(config.rtsp_transport.clone()));
        Box::new(
            InteractiveAdjudicator::new(Box::new(operator), config.display_budget())
                .with_cancellation(self.cancel.clone()),
        )
    }
}

#[async_trait]
impl HealthCheck for CameraFleetCheck {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn evaluate(&mut self, config: &SuiteConfig) -> Result<CheckOutcome, CheckError> {
        let camera = &config.camera;
        let adjudicator = match self.adjudicator.take() {
            Some(adjudicator) => adjudicator,
            None => self.configured_adjudicator(camera),
        };

        let mut fleet = FleetOrchestrator::new(camera, Arc::clone(&self.prober), adjudicator);
        if let Some(callback) = self.on_progress.clone() {
            fleet = fleet.on_progress(Box::new(move |event| callback(event)));
        }

        let result = fleet.run().await;

        let mut summary = format!(
            "{} passed, {} failed, {} skipped of {} camera(s)",
            result.pass_count, result.fail_count, result.skip_count, result.total
        );
        for cause in &result.fail_causes {
            summary.push_str("; ");
            summary.push_str(&cause.to_string());
        }

        Ok(CheckOutcome::new(result.status.into(), summary)
            .with_details(CheckDetails::Cameras(result)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedAdjudicator, ScriptedProber};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticCheck {
        name: String,
        result: Result<CheckStatus, String>,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl HealthCheck for StaticCheck {
        fn name(&self) -> &str {
            &self.name
        }

        async fn evaluate(&mut self, _config: &SuiteConfig) -> Result<CheckOutcome, CheckError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Ok(status) => Ok(CheckOutcome::new(*status, format!("{} {status}", self.name))),
                Err(message) => Err(CheckError::Execution(message.clone())),
            }
        }
    }

    fn static_factory(
        name: &'static str,
        result: Result<CheckStatus, String>,
        runs: &Arc<AtomicUsize>,
    ) -> CheckFactory {
        let runs = Arc::clone(runs);
        Box::new(move |_: &SuiteConfig, _: &CheckContext| -> Box<dyn HealthCheck> {
            Box::new(StaticCheck {
                name: name.to_string(),
                result: result.clone(),
                runs: Arc::clone(&runs),
            })
        })
    }

    fn registry(
        checks: &[(&'static str, Result<CheckStatus, String>)],
    ) -> (CheckRegistry, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut registry = CheckRegistry::new();
        for (name, result) in checks {
            registry.register(*name, static_factory(*name, result.clone(), &runs));
        }
        (registry, runs)
    }

    #[test]
    fn test_default_registry_has_camera_check() {
        assert_eq!(CheckRegistry::with_defaults().names(), vec!["camera"]);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let (mut registry, _) = registry(&[("power", Ok(CheckStatus::Pass))]);
        let runs = Arc::new(AtomicUsize::new(0));
        registry.register("power", static_factory("power", Ok(CheckStatus::Fail), &runs));
        assert_eq!(registry.names(), vec!["power"]);
    }

    #[test]
    fn test_unknown_check_lists_available() {
        let (registry, _) = registry(&[
            ("power", Ok(CheckStatus::Pass)),
            ("camera", Ok(CheckStatus::Pass)),
        ]);

        let err = registry
            .resolve(&["camera".to_string(), "disk".to_string()])
            .err()
            .unwrap();

        match err {
            CheckError::UnknownChecks { unknown, available } => {
                assert_eq!(unknown, "disk");
                assert_eq!(available, "power, camera");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_keeps_registry_order() {
        let (registry, _) = registry(&[
            ("power", Ok(CheckStatus::Pass)),
            ("camera", Ok(CheckStatus::Pass)),
            ("storage", Ok(CheckStatus::Pass)),
        ]);

        let resolved = registry
            .resolve(&["Storage".to_string(), "power".to_string()])
            .unwrap();
        let names: Vec<&str> = resolved.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["power", "storage"]);

        assert_eq!(registry.resolve(&[]).unwrap().len(), 3);
    }

    #[test]
    fn test_summarize_rules() {
        use CheckStatus::{Error, Fail, Pass, Quit, Skip};
        assert_eq!(summarize([]), Skip);
        assert_eq!(summarize([Pass, Pass]), Pass);
        assert_eq!(summarize([Pass, Skip]), Skip);
        assert_eq!(summarize([Skip, Fail]), Fail);
        assert_eq!(summarize([Pass, Error]), Fail);
        assert_eq!(summarize([Fail, Quit]), Quit);
    }

    #[tokio::test]
    async fn test_run_timed_captures_errors() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut check = StaticCheck {
            name: "storage".to_string(),
            result: Err("mount missing".to_string()),
            runs: Arc::clone(&runs),
        };

        let report = run_timed(&mut check, &SuiteConfig::default()).await;

        assert_eq!(report.name, "storage");
        assert_eq!(report.status, CheckStatus::Error);
        assert_eq!(report.summary, "check failed: mount missing");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_runner_stops_after_quit() {
        let (registry, runs) = registry(&[
            ("power", Ok(CheckStatus::Pass)),
            ("camera", Ok(CheckStatus::Quit)),
            ("storage", Ok(CheckStatus::Pass)),
        ]);
        let runner = SuiteRunner::new(registry, CheckContext::default());

        let report = runner.run(&SuiteConfig::default(), &[]).await.unwrap();

        assert_eq!(report.status, CheckStatus::Quit);
        assert_eq!(report.checks.len(), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_runner_uses_configured_selection_and_emits_events() {
        let (registry, _) = registry(&[
            ("power", Ok(CheckStatus::Pass)),
            ("camera", Ok(CheckStatus::Skip)),
        ]);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let runner = SuiteRunner::new(registry, CheckContext::default()).on_event(Box::new(
            move |event| {
                let line = match event {
                    SuiteEvent::CheckStarted { name, percent, .. } => {
                        format!("start {name} {percent}")
                    }
                    SuiteEvent::CheckFinished { report, percent } => {
                        format!("finish {} {} {percent}", report.name, report.status)
                    }
                };
                sink.lock().unwrap().push(line);
            },
        ));
        let config = SuiteConfig {
            checks: vec!["camera".to_string()],
            ..SuiteConfig::default()
        };

        let report = runner.run(&config, &[]).await.unwrap();

        assert_eq!(report.status, CheckStatus::Skip);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["start camera 0", "finish camera SKIP 100"]
        );
    }

    #[tokio::test]
    async fn test_runner_rejects_unknown_selection() {
        let runner = SuiteRunner::new(CheckRegistry::with_defaults(), CheckContext::default());
        let result = runner
            .run(&SuiteConfig::default(), &["os".to_string()])
            .await;
        assert!(matches!(result, Err(CheckError::UnknownChecks { .. })));
    }

    #[tokio::test]
    async fn test_camera_check_reports_fleet_details() {
        let mut check = CameraFleetCheck::with_collaborators(
            Arc::new(ScriptedProber::new()),
            Box::new(ScriptedAdjudicator::automatic()),
        );
        let mut config = SuiteConfig::default();
        config.camera.camera_count = 0;

        let report = run_timed(&mut check, &config).await;

        assert_eq!(report.name, "camera");
        assert_eq!(report.status, CheckStatus::Skip);
        assert_eq!(report.summary, "0 passed, 0 failed, 0 skipped of 0 camera(s)");
        match report.details {
            Some(CheckDetails::Cameras(fleet)) => assert_eq!(fleet.total, 0),
            other => panic!("expected camera details, got {other:?}"),
        }
    }
}
