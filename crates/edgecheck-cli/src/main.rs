//! # edgecheck
//!
//! Binary entry point for the edge device health verification suite.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Logging setup (stderr, so `--format json` output stays clean)
//! - Ctrl-C handling, mapped to an operator quit
//! - Terminal or JSON rendering of the suite report

mod display;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use edgecheck_core::{CheckContext, CheckRegistry, CheckStatus, SuiteConfig, SuiteRunner};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: i32 = 1;
const EXIT_QUIT: i32 = 130;

/// Adjudication mode for stream checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Frame read is PASS, anything else FAIL
    Auto,
    /// Show each stream to an operator and ask for a verdict
    Interactive,
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Coloured progress, tables and summary
    #[default]
    Human,
    /// The full report as JSON on stdout
    Json,
}

/// Health verification for edge recording devices.
#[derive(Parser, Debug)]
#[command(name = "edgecheck")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of cameras to check (negative counts as zero)
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub cameras: Option<i64>,

    /// Stream adjudication mode
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Run only specific check(s)
    #[arg(long, value_name = "NAME", action = ArgAction::Append)]
    pub check: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Applies flag overrides on top of file and environment configuration.
    fn apply_overrides(&self, config: &mut SuiteConfig) {
        if let Some(cameras) = self.cameras {
            config.camera.camera_count = u32::try_from(cameras.max(0)).unwrap_or(u32::MAX);
        }
        if let Some(mode) = self.mode {
            config.camera.auto_mode = mode == Mode::Auto;
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(status: CheckStatus) -> i32 {
    match status {
        CheckStatus::Pass | CheckStatus::Skip => 0,
        CheckStatus::Fail | CheckStatus::Error => EXIT_FAILURE,
        CheckStatus::Quit => EXIT_QUIT,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config =
        SuiteConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    debug!(
        cameras = config.camera.camera_count,
        auto_mode = config.camera.auto_mode,
        log_root = %config.camera.log_root.display(),
        artifact_root = %config.camera.artifact_root.display(),
        "Effective configuration"
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping");
                cancel.cancel();
            }
        }
    });

    let human = cli.format == OutputFormat::Human;
    let context = CheckContext {
        cancel: cancel.clone(),
        camera_progress: human.then(display::camera_progress_callback),
    };
    let mut runner = SuiteRunner::new(CheckRegistry::with_defaults(), context);
    if human {
        runner = runner.on_event(display::suite_event_callback());
    }

    // Interactive runs turn Ctrl-C into an operator quit and still report.
    // Automatic runs are dropped, which kills any running probe.
    let interactive = !config.camera.auto_mode;
    let report = tokio::select! {
        report = runner.run(&config, &cli.check) => Some(report?),
        () = cancel.cancelled(), if !interactive => None,
    };
    let Some(report) = report else {
        eprintln!("Interrupted");
        std::process::exit(EXIT_QUIT);
    };

    match cli.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?
            );
        }
        OutputFormat::Human => display::print_report(&report),
    }

    std::process::exit(exit_code(report.status));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_camera_count_is_zero() {
        let cli = Cli::parse_from(["edgecheck", "--cameras", "-3"]);
        let mut config = SuiteConfig::default();

        cli.apply_overrides(&mut config);

        assert_eq!(config.camera.camera_count, 0);
    }

    #[test]
    fn test_mode_and_checks() {
        let cli = Cli::parse_from([
            "edgecheck",
            "--mode",
            "interactive",
            "--check",
            "camera",
            "--cameras",
            "6",
            "--format",
            "json",
        ]);
        let mut config = SuiteConfig::default();

        cli.apply_overrides(&mut config);

        assert!(!config.camera.auto_mode);
        assert_eq!(config.camera.camera_count, 6);
        assert_eq!(cli.check, vec!["camera".to_string()]);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_flags_absent_keep_config() {
        let cli = Cli::parse_from(["edgecheck"]);
        let mut config = SuiteConfig::default();
        config.camera.camera_count = 8;
        config.camera.auto_mode = false;

        cli.apply_overrides(&mut config);

        assert_eq!(config.camera.camera_count, 8);
        assert!(!config.camera.auto_mode);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(CheckStatus::Pass), 0);
        assert_eq!(exit_code(CheckStatus::Skip), 0);
        assert_eq!(exit_code(CheckStatus::Fail), 1);
        assert_eq!(exit_code(CheckStatus::Error), 1);
        assert_eq!(exit_code(CheckStatus::Quit), 130);
    }
}
