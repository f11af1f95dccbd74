//! Stream adjudication.
//!
//! Turns a probe result into a verdict. Two strategies exist:
//!
//! ```text
//! Automatic:   TESTING ─┬─ probe ok ──▶ PASS
//!                       └─ probe err ─▶ FAIL
//!
//! Interactive: CONNECTING ─ probe err ─────────────────────────▶ FAIL
//!                  │
//!                  ▼ probe ok
//!              CONNECTED ─▶ DISPLAYING ─ key ──────────────────▶ PASS/FAIL/SKIP/QUIT
//!                               │ budget exhausted / viewer closed
//!                               ▼
//!                          AWAITING_INPUT ─ answer (no timeout) ▶ PASS/FAIL/SKIP/QUIT
//! ```
//!
//! QUIT is a fleet-wide signal. The adjudicator only reports it; the fleet
//! orchestrator is responsible for stopping.

use std::fmt;
use std::io::{Stderr, Write};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::probe::StreamProbeResult;
use crate::targets::CameraTarget;

/// Verdict assigned to one probed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
    Skip,
    Quit,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
            Verdict::Skip => write!(f, "SKIP"),
            Verdict::Quit => write!(f, "QUIT"),
        }
    }
}

/// Which of a camera's two endpoints is being adjudicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Source,
    ReStream,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Source => write!(f, "source"),
            StreamKind::ReStream => write!(f, "re-stream"),
        }
    }
}

/// States of the adjudication state machine, logged on each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjudicationPhase {
    Testing,
    Connecting,
    Connected,
    Displaying,
    AwaitingInput,
}

/// Everything an adjudicator or operator needs to know about one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReview {
    pub camera_number: u32,
    pub kind: StreamKind,
    pub endpoint: String,
    /// Human-readable address: `ip:port` for sources, the relay port otherwise.
    pub address: String,
}

impl StreamReview {
    pub fn for_target(target: &CameraTarget, kind: StreamKind, source_port: u16) -> Self {
        match kind {
            StreamKind::Source => Self {
                camera_number: target.camera_number,
                kind,
                endpoint: target.source_endpoint.clone(),
                address: format!("{}:{}", target.ip_address, source_port),
            },
            StreamKind::ReStream => Self {
                camera_number: target.camera_number,
                kind,
                endpoint: target.re_stream_endpoint.clone(),
                address: format!("port {}", target.re_stream_port),
            },
        }
    }

    pub fn label(&self) -> String {
        format!("Camera {} {} ({})", self.camera_number, self.kind, self.address)
    }
}

/// Decides the verdict for one probed stream.
#[async_trait]
pub trait Adjudicator: Send {
    async fn adjudicate(&mut self, review: &StreamReview, probe: &StreamProbeResult) -> Verdict;
}

/// Frame read success is PASS, anything else is FAIL. Never waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutomaticAdjudicator;

#[async_trait]
impl Adjudicator for AutomaticAdjudicator {
    async fn adjudicate(&mut self, review: &StreamReview, probe: &StreamProbeResult) -> Verdict {
        debug!(camera = review.camera_number, stream = %review.kind, phase = ?AdjudicationPhase::Testing);
        match probe {
            StreamProbeResult::Connected { width, height } => {
                info!(
                    camera = review.camera_number,
                    stream = %review.kind,
                    resolution = %format!("{width}x{height}"),
                    "Frame read, automatic PASS"
                );
                Verdict::Pass
            }
            StreamProbeResult::Failed { error } => {
                warn!(camera = review.camera_number, stream = %review.kind, error = %error, "Stream unreachable, automatic FAIL");
                Verdict::Fail
            }
        }
    }
}

/// The human side of interactive adjudication.
#[async_trait]
pub trait Operator: Send {
    /// Shows the stream and waits for a decision key.
    ///
    /// Returns `Ok(None)` when the display ends without a decision (viewer
    /// closed, input exhausted). The caller bounds this call with the
    /// display budget and may drop it at any await point.
    async fn watch(&mut self, review: &StreamReview) -> std::io::Result<Option<Verdict>>;

    /// Asks for a verdict on the console. Has no timeout of its own.
    async fn prompt(&mut self, review: &StreamReview) -> Verdict;
}

/// Shows each connected stream to an operator and waits for a verdict.
pub struct InteractiveAdjudicator {
    operator: Box<dyn Operator>,
    display_budget: Duration,
    cancel: CancellationToken,
}

impl InteractiveAdjudicator {
    pub fn new(operator: Box<dyn Operator>, display_budget: Duration) -> Self {
        Self {
            operator,
            display_budget,
            cancel: CancellationToken::new(),
        }
    }

    /// Resolves any pending or future adjudication to QUIT once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[async_trait]
impl Adjudicator for InteractiveAdjudicator {
    async fn adjudicate(&mut self, review: &StreamReview, probe: &StreamProbeResult) -> Verdict {
        let camera = review.camera_number;
        debug!(camera, stream = %review.kind, phase = ?AdjudicationPhase::Connecting);

        if self.cancel.is_cancelled() {
            info!(camera, stream = %review.kind, "Cancelled before review");
            return Verdict::Quit;
        }
        if let StreamProbeResult::Failed { error } = probe {
            warn!(camera, stream = %review.kind, error = %error, "Connection failed, FAIL without review");
            return Verdict::Fail;
        }

        debug!(camera, stream = %review.kind, phase = ?AdjudicationPhase::Connected, resolution = ?probe.resolution());
        debug!(camera, stream = %review.kind, phase = ?AdjudicationPhase::Displaying);

        let watched = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Verdict::Quit,
            watched = tokio::time::timeout(self.display_budget, self.operator.watch(review)) => watched,
        };

        match watched {
            Ok(Ok(Some(verdict))) => {
                info!(camera, stream = %review.kind, verdict = %verdict, "Operator verdict");
                return verdict;
            }
            Ok(Ok(None)) => info!(camera, stream = %review.kind, "Display ended without a decision"),
            Ok(Err(err)) => {
                warn!(camera, stream = %review.kind, error = %err, "Stream display failed");
                return Verdict::Fail;
            }
            Err(_) => info!(
                camera,
                stream = %review.kind,
                budget_secs = self.display_budget.as_secs(),
                "Display budget exhausted, asking on the console"
            ),
        }

        debug!(camera, stream = %review.kind, phase = ?AdjudicationPhase::AwaitingInput);
        let verdict = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Verdict::Quit,
            verdict = self.operator.prompt(review) => verdict,
        };
        info!(camera, stream = %review.kind, verdict = %verdict, "Operator verdict");
        verdict
    }
}

/// Launches a viewer window for a stream.
#[derive(Debug, Clone)]
pub struct ViewerCommand {
    program: String,
    rtsp_transport: String,
}

impl ViewerCommand {
    /// `ffplay` with the given RTSP transport.
    pub fn ffplay(rtsp_transport: impl Into<String>) -> Self {
        Self {
            program: "ffplay".to_string(),
            rtsp_transport: rtsp_transport.into(),
        }
    }

    fn spawn(&self, review: &StreamReview) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args([
                "-loglevel",
                "quiet",
                "-rtsp_transport",
                &self.rtsp_transport,
                "-window_title",
                &review.label(),
                "-x",
                "800",
                "-y",
                "600",
                &review.endpoint,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}

/// Console operator: optional viewer window plus line-based key input.
///
/// During display, `p`/`f`/`s`/`q` (or ESC) followed by Enter decide the
/// stream and anything else is ignored. At the prompt an unrecognised
/// answer counts as SKIP and end of input as QUIT.
///
/// Instructions go to stderr unless another writer is given, so stdout
/// only ever carries the report.
pub struct ConsoleOperator<R, W = Stderr> {
    input: Lines<R>,
    output: W,
    viewer: Option<ViewerCommand>,
}

impl ConsoleOperator<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> ConsoleOperator<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            input: reader.lines(),
            output: std::io::stderr(),
            viewer: None,
        }
    }
}

impl<R, W> ConsoleOperator<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    /// Writes instructions and prompts to `output` instead of stderr.
    pub fn with_output<O: Write + Send>(self, output: O) -> ConsoleOperator<R, O> {
        ConsoleOperator {
            input: self.input,
            output,
            viewer: self.viewer,
        }
    }

    pub fn with_viewer(mut self, viewer: ViewerCommand) -> Self {
        self.viewer = Some(viewer);
        self
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    fn show(&mut self, text: &str) -> std::io::Result<()> {
        self.output.write_all(text.as_bytes())?;
        self.output.flush()
    }
}

async fn wait_for_exit(viewer: &mut Option<Child>) -> std::io::Result<std::process::ExitStatus> {
    match viewer {
        Some(child) => child.wait().await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl<R, W> Operator for ConsoleOperator<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    async fn watch(&mut self, review: &StreamReview) -> std::io::Result<Option<Verdict>> {
        let mut viewer = match &self.viewer {
            Some(command) => Some(command.spawn(review)?),
            None => None,
        };

        self.show(&format!(
            "Reviewing {}\n  [p] PASS  [f] FAIL  [s] SKIP  [q] QUIT  (key, then Enter)\n",
            review.label()
        ))?;

        loop {
            tokio::select! {
                line = self.input.next_line() => match line? {
                    Some(line) => {
                        if let Some(verdict) = parse_watch_key(&line) {
                            return Ok(Some(verdict));
                        }
                    }
                    None => return Ok(None),
                },
                status = wait_for_exit(&mut viewer) => {
                    debug!(camera = review.camera_number, status = ?status, "Viewer exited");
                    return Ok(None);
                }
            }
        }
    }

    async fn prompt(&mut self, review: &StreamReview) -> Verdict {
        let question = format!(
            "\n{} result?\n  [p] PASS  [f] FAIL  [s] SKIP  [q] QUIT\n> ",
            review.label()
        );
        if let Err(err) = self.show(&question) {
            debug!(camera = review.camera_number, error = %err, "Failed to write prompt");
        }

        match self.input.next_line().await {
            Ok(Some(answer)) => parse_prompt_answer(&answer),
            Ok(None) | Err(_) => Verdict::Quit,
        }
    }
}

fn parse_watch_key(line: &str) -> Option<Verdict> {
    match line.trim().to_lowercase().as_str() {
        "p" => Some(Verdict::Pass),
        "f" => Some(Verdict::Fail),
        "s" => Some(Verdict::Skip),
        "q" | "\u{1b}" => Some(Verdict::Quit),
        _ => None,
    }
}

fn parse_prompt_answer(answer: &str) -> Verdict {
    parse_watch_key(answer).unwrap_or(Verdict::Skip)
}
