//! Terminal rendering of progress and results.

use std::sync::Arc;

use colored::{ColoredString, Colorize};
use edgecheck_core::{
    CameraCheckResult, CheckDetails, CheckReport, CheckStatus, FleetCheckResult, ProgressEvent,
    SharedProgressCallback, Stage, SuiteEvent, SuiteEventCallback, SuiteReport,
};

/// Colours a status word.
fn paint(status: &str) -> ColoredString {
    match status {
        "PASS" => status.green().bold(),
        "FAIL" | "ERROR" => status.red().bold(),
        "SKIP" => status.yellow(),
        "QUIT" => status.magenta().bold(),
        other => other.normal(),
    }
}

fn padded(status: &str, width: usize) -> String {
    let padding = " ".repeat(width.saturating_sub(status.len()));
    format!("{}{padding}", paint(status))
}

pub fn suite_event_callback() -> SuiteEventCallback {
    Box::new(|event| match event {
        SuiteEvent::CheckStarted {
            name, index, total, ..
        } => {
            println!(
                "\n{} {}",
                format!("▶ {name}").bold(),
                format!("({}/{total})", index + 1).dimmed()
            );
        }
        SuiteEvent::CheckFinished { report, .. } => {
            println!(
                "{} {} {}",
                format!("◀ {}", report.name).bold(),
                paint(&report.status.to_string()),
                format!("in {:.1}s", report.elapsed.as_secs_f64()).dimmed()
            );
        }
    })
}

pub fn camera_progress_callback() -> SharedProgressCallback {
    Arc::new(|event| match event {
        ProgressEvent::FleetStarted { total } => {
            println!("{}", format!("Checking {total} camera(s)").dimmed());
        }
        ProgressEvent::StageStarted {
            camera_number,
            stage,
            percent,
        } => {
            let subject = match (camera_number, stage) {
                (Some(n), _) => format!("Camera {n}: {stage}"),
                (None, Stage::VideoArtifacts) => "Fleet: video artifacts".to_string(),
                (None, other) => other.to_string(),
            };
            println!("{}", format!("  [{percent:>3}%] {subject}").dimmed());
        }
        ProgressEvent::CameraCompleted { result, percent } => {
            println!(
                "  [{percent:>3}%] {} {}",
                result.name.bold(),
                paint(&result.overall.to_string())
            );
        }
        ProgressEvent::FleetCompleted { .. } => {}
    })
}

fn verdict_cell<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Table rows for a fleet: header first, then one row per camera.
fn camera_rows(fleet: &FleetCheckResult) -> Vec<String> {
    let mut rows = vec![format!(
        "  {:<10} {:<16} {:<6} {:<9} {:<6} {}",
        "Camera", "Address", "Source", "Re-stream", "Log", "Overall"
    )];
    rows.extend(fleet.cameras.iter().map(camera_row));
    rows
}

fn camera_row(camera: &CameraCheckResult) -> String {
    format!(
        "  {:<10} {:<16} {} {} {} {}",
        camera.name,
        camera.ip_address,
        padded(&camera.source_status.to_string(), 6),
        padded(&verdict_cell(camera.re_stream_status), 9),
        padded(&verdict_cell(camera.log_status.as_ref().map(|l| l.status)), 6),
        paint(&camera.overall.to_string())
    )
}

fn camera_notes(camera: &CameraCheckResult) -> Vec<String> {
    let mut notes = Vec::new();
    if let Some(error) = camera.source_probe.error() {
        notes.push(format!("source: {error}"));
    }
    if let Some(error) = camera.re_stream_probe.as_ref().and_then(|p| p.error()) {
        notes.push(format!("re-stream: {error}"));
    }
    if let Some(reason) = camera.log_status.as_ref().and_then(|l| l.fail_reason.as_ref()) {
        notes.push(format!("log: {reason}"));
    }
    notes
}

fn print_fleet(fleet: &FleetCheckResult) {
    println!();
    for row in camera_rows(fleet) {
        println!("{row}");
    }
    for camera in &fleet.cameras {
        for note in camera_notes(camera) {
            println!("    {} {}", format!("{}:", camera.name).dimmed(), note);
        }
    }

    match &fleet.video_artifacts {
        Some(artifacts) if artifacts.is_pass() => {
            println!("\n  Video artifacts: {}", paint("PASS"));
        }
        Some(artifacts) => {
            let missing: Vec<String> = artifacts
                .missing_cameras
                .iter()
                .map(u32::to_string)
                .collect();
            println!(
                "\n  Video artifacts: {} (missing: camera {})",
                paint("FAIL"),
                missing.join(", ")
            );
        }
        None => println!("\n  Video artifacts: {}", "not checked".dimmed()),
    }
}

fn print_check(report: &CheckReport) {
    println!(
        "\n{} {} {}",
        report.name.bold(),
        paint(&report.status.to_string()),
        report.summary.dimmed()
    );
    if let Some(CheckDetails::Cameras(fleet)) = &report.details {
        print_fleet(fleet);
    }
}

/// Prints every check and the suite verdict.
pub fn print_report(report: &SuiteReport) {
    println!("\n{}", "━".repeat(40).dimmed());
    for check in &report.checks {
        print_check(check);
    }

    let passed = report
        .checks
        .iter()
        .filter(|c| c.status == CheckStatus::Pass)
        .count();
    println!("\n{}", "━".repeat(40).dimmed());
    println!(
        "{} {}",
        "Result:".bold(),
        paint(&report.status.to_string())
    );
    println!(
        "   {}",
        format!("{passed} of {} check(s) passed", report.checks.len()).dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgecheck_core::{
        CameraStatus, FleetStatus, LogCheckResult, LogStatus, StreamProbeResult, Verdict,
    };

    fn camera(re_stream: Option<Verdict>, log: Option<LogStatus>) -> CameraCheckResult {
        CameraCheckResult {
            camera_number: 2,
            name: "Camera 2".to_string(),
            ip_address: "192.168.1.102".to_string(),
            re_stream_port: 1112,
            source_status: Verdict::Fail,
            source_probe: StreamProbeResult::failed("failed to open stream: timeout"),
            re_stream_status: re_stream,
            re_stream_probe: re_stream.map(|_| StreamProbeResult::connected(640, 480)),
            log_status: log.map(|status| LogCheckResult {
                status,
                log_file: None,
                details: None,
                fail_reason: (status == LogStatus::Fail).then(|| "no completion record".to_string()),
            }),
            overall: CameraStatus::Fail,
            fail_reasons: Vec::new(),
        }
    }

    #[test]
    fn test_camera_row_columns() {
        colored::control::set_override(false);
        let row = camera_row(&camera(Some(Verdict::Pass), Some(LogStatus::Skip)));
        assert_eq!(row, "  Camera 2   192.168.1.102    FAIL   PASS      SKIP   FAIL");
    }

    #[test]
    fn test_camera_row_marks_unreached_steps() {
        colored::control::set_override(false);
        let row = camera_row(&camera(None, None));
        assert!(row.ends_with("FAIL   -         -      FAIL"), "{row}");
    }

    #[test]
    fn test_camera_notes_collect_reasons() {
        let notes = camera_notes(&camera(Some(Verdict::Pass), Some(LogStatus::Fail)));
        assert_eq!(
            notes,
            vec![
                "source: failed to open stream: timeout".to_string(),
                "log: no completion record".to_string(),
            ]
        );
    }

    #[test]
    fn test_table_has_header_and_rows() {
        colored::control::set_override(false);
        let fleet = FleetCheckResult {
            status: FleetStatus::Fail,
            total: 1,
            pass_count: 0,
            fail_count: 1,
            skip_count: 0,
            cameras: vec![camera(Some(Verdict::Pass), Some(LogStatus::Pass))],
            video_artifacts: None,
            fail_causes: Vec::new(),
        };
        let rows = camera_rows(&fleet);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].trim_start().starts_with("Camera"));
    }
}
