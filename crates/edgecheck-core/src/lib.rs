//! # edgecheck-core
//!
//! Verification pipeline for the camera fleet of an edge recording device.
//!
//! For each camera the pipeline probes the source stream and its re-stream
//! relay, has every probe adjudicated (automatically or by an operator), and
//! checks the recorder's completion log. Once all cameras are done a single
//! sweep confirms that recent video files exist for each of them.
//!
//! The pipeline is one [`HealthCheck`] among those a [`SuiteRunner`] can run;
//! checks are looked up by name in an explicit [`CheckRegistry`].

mod error;

pub mod adjudicator;
pub mod artifacts;
pub mod config;
pub mod evaluator;
pub mod fleet;
pub mod probe;
pub mod recording_log;
pub mod suite;
pub mod targets;
pub mod testing;

pub use adjudicator::{
    AdjudicationPhase, Adjudicator, AutomaticAdjudicator, ConsoleOperator, InteractiveAdjudicator,
    Operator, StreamKind, StreamReview, Verdict, ViewerCommand,
};
pub use artifacts::{ArtifactStatus, FoundArtifact, VideoArtifactResult, VideoArtifactVerifier};
pub use config::{CameraConfig, LogTolerances, SuiteConfig};
pub use error::{CheckError, ConfigError, ProbeError};
pub use evaluator::{CameraCheckResult, CameraEvaluator, CameraStatus, Stage};
pub use fleet::{
    FailCause, FleetCheckResult, FleetOrchestrator, FleetStatus, ProgressCallback, ProgressEvent,
};
pub use probe::{FfprobeProber, StreamProbeResult, StreamProber, redact_credentials};
pub use recording_log::{LogCheckResult, LogStatus, RecordingLogEntry, RecordingLogVerifier};
pub use suite::{
    CameraFleetCheck, CheckContext, CheckDetails, CheckFactory, CheckOutcome, CheckRegistry,
    CheckReport, CheckStatus, HealthCheck, SharedProgressCallback, SuiteEvent, SuiteEventCallback,
    SuiteReport, SuiteRunner, run_timed, summarize,
};
pub use targets::{CameraTarget, generate_targets};
