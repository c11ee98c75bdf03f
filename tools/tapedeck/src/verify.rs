use crate::classify::{classify, Classification, OcrClient, Verdict};
use crate::config::AppConfig;
use crate::discovery::discover_artifacts;
use crate::errors::TapedeckError;
use crate::frame::FrameProbe;
use crate::logging::append_run_log;
use crate::runtime::{FileSystem, ProcessRunner, Terminal};
use crate::shim::resolve_tool;
use serde_json::json;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReport {
    pub name: String,
    pub verdict: Verdict,
    pub reason: String,
}

/// Verifies every discovered artifact by classifying its last frame, prints
/// the verdict table, and reports exit status 1 iff any artifact came back
/// incomplete.
pub fn verify_all(
    cfg: &AppConfig,
    root: &Path,
    save_frames: bool,
    fs: &dyn FileSystem,
    runner: &dyn ProcessRunner,
    terminal: &dyn Terminal,
) -> Result<i32, TapedeckError> {
    // Both external tools are required before any work starts.
    resolve_tool(runner, &cfg.verify.ocr)?;
    resolve_tool(runner, &cfg.verify.probe)?;

    terminal.write_line("🔍 verifying demo artifacts...")?;
    terminal.write_line("")?;

    let frames_dir = &cfg.verify.frames_dir;
    if fs.exists(frames_dir) {
        fs.remove_dir_all(frames_dir)?;
    }
    fs.create_dir_all(frames_dir)?;

    let artifacts = discover_artifacts(fs, root, cfg)?;
    if artifacts.is_empty() {
        terminal.write_line("no artifact files found")?;
        return Ok(0);
    }
    terminal.write_line(&format!("found {} artifact(s)", artifacts.len()))?;
    terminal.write_line("")?;

    let probe = FrameProbe::new(runner, &cfg.verify);
    let ocr = OcrClient::new(runner, &cfg.verify);
    let reports = artifacts
        .iter()
        .map(|artifact| check_artifact(artifact, cfg, &probe, &ocr, fs))
        .collect::<Vec<_>>();

    print_table(terminal, &reports)?;

    let complete = reports
        .iter()
        .filter(|report| matches!(report.verdict, Verdict::Ok | Verdict::OkUncertain))
        .count();
    let incomplete = reports
        .iter()
        .filter(|report| report.verdict == Verdict::Incomplete)
        .count();
    let unknown = reports
        .iter()
        .filter(|report| matches!(report.verdict, Verdict::Unknown | Verdict::Error))
        .count();

    terminal.write_line("")?;
    terminal.write_line(&format!(
        "✓ complete: {complete}  ✗ incomplete: {incomplete}  ? unknown: {unknown}"
    ))?;
    if incomplete > 0 {
        terminal.write_line("")?;
        terminal
            .write_line("incomplete artifacts usually need a longer response wait in their scripts")?;
    }

    if save_frames {
        terminal.write_line("")?;
        terminal.write_line(&format!(
            "last-frame stills saved to: {}",
            frames_dir.display()
        ))?;
    } else if let Err(error) = fs.remove_dir_all(frames_dir) {
        append_run_log(
            "warn",
            "verify.frames_cleanup_failed",
            json!({ "dir": frames_dir.display().to_string(), "error": error.to_string() }),
        );
    }

    append_run_log(
        "info",
        "verify.finished",
        json!({
            "artifacts": reports.len(),
            "complete": complete,
            "incomplete": incomplete,
            "unknown": unknown
        }),
    );
    Ok(exit_code_for(&reports))
}

/// Non-zero exactly when at least one artifact classified incomplete;
/// `ERROR`/`UNKNOWN` verdicts are reported data, not failures.
pub fn exit_code_for(reports: &[ArtifactReport]) -> i32 {
    let incomplete = reports
        .iter()
        .any(|report| report.verdict == Verdict::Incomplete);
    i32::from(incomplete)
}

pub fn check_artifact(
    artifact: &Path,
    cfg: &AppConfig,
    probe: &FrameProbe<'_>,
    ocr: &OcrClient<'_>,
    fs: &dyn FileSystem,
) -> ArtifactReport {
    let stem = artifact
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| artifact.display().to_string());
    let chapter = artifact
        .parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let prefix = chapter.chars().take(2).collect::<String>();
    let name = format!("{prefix}/{stem}");

    // Stills are chapter-prefixed so artifacts from different chapters never
    // collide in the shared temp directory.
    let still = cfg.verify.frames_dir.join(format!("{prefix}-{stem}.png"));
    let extracted = probe.extract_last_frame(fs, artifact, &still);
    let text = if extracted {
        ocr.recognize(&still)
    } else {
        String::new()
    };
    let Classification { verdict, reason } = classify(
        extracted,
        &text,
        &cfg.verify.failure_patterns,
        &cfg.verify.success_patterns,
    );
    ArtifactReport {
        name,
        verdict,
        reason,
    }
}

fn print_table(
    terminal: &dyn Terminal,
    reports: &[ArtifactReport],
) -> Result<(), TapedeckError> {
    let name_width = reports
        .iter()
        .map(|report| report.name.chars().count() + 2)
        .fold(32usize, usize::max);
    let status_width = 14usize;

    let header = format!(
        "{:<name_width$}{:<status_width$}{}",
        "Artifact", "Status", "Details"
    );
    let separator = "─".repeat(header.chars().count() + 10);

    terminal.write_line(&separator)?;
    terminal.write_line(&header)?;
    terminal.write_line(&separator)?;
    for report in reports {
        let status = format!("{} {}", report.verdict.icon(), report.verdict.label());
        terminal.write_line(&format!(
            "{:<name_width$}{:<status_width$}{}",
            report.name, status, report.reason
        ))?;
    }
    terminal.write_line(&separator)?;
    Ok(())
}
