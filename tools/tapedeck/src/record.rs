use crate::config::{AppConfig, RecordingConfig};
use crate::discovery::{discover_scripts, Job};
use crate::errors::TapedeckError;
use crate::logging::append_run_log;
use crate::pool::run_bounded;
use crate::runtime::{Clock, FileSystem, ProcessRequest, ProcessRunner, Terminal};
use crate::shim::{install_shim, remove_shim};
use crate::tool_state::OnAirGuard;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub path: String,
    pub success: bool,
}

/// Execution context for one recording invocation: the shimmed search path
/// and the root every script runs from, threaded explicitly so concurrent
/// batches never fight over process-global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEnv {
    pub root: PathBuf,
    pub path_value: String,
}

/// Runs one recording script with a hard wall-clock timeout. Timeouts and
/// non-zero exits both come back as a failed result; the batch decides what
/// to do with them.
pub fn run_recording(
    job: &Job,
    env: &RecordEnv,
    cfg: &RecordingConfig,
    fs: &dyn FileSystem,
    runner: &dyn ProcessRunner,
    clock: &dyn Clock,
    terminal: &dyn Terminal,
) -> JobResult {
    let rel_display = job
        .script_path
        .strip_prefix(&env.root)
        .unwrap_or(&job.script_path)
        .display()
        .to_string();

    let started = clock.now();
    let outcome = runner.run_with_timeout(
        ProcessRequest {
            program: cfg.recorder.clone(),
            args: vec![rel_display.clone()],
            cwd: Some(env.root.clone()),
            env: vec![("PATH".to_string(), env.path_value.clone())],
        },
        Duration::from_secs(cfg.timeout_seconds),
    );
    let elapsed = clock
        .now()
        .duration_since(started)
        .unwrap_or_default()
        .as_secs();

    let failure = match outcome {
        Ok(out) if out.exit_code == 0 => None,
        Ok(out) => {
            let stderr = out.stderr.trim().to_string();
            Some(if stderr.is_empty() {
                format!("exit code {}", out.exit_code)
            } else {
                stderr
            })
        }
        Err(error) => Some(error.to_string()),
    };

    if let Some(message) = failure {
        let _ = terminal.write_line(&format!("  ✗ {rel_display} ({elapsed}s) - {message}"));
        append_run_log(
            "error",
            "record.job.failed",
            json!({ "script": rel_display, "elapsed_secs": elapsed, "error": message }),
        );
        return JobResult {
            path: rel_display,
            success: false,
        };
    }

    relocate_artifact(job, env, fs);
    let _ = terminal.write_line(&format!("  ✓ {rel_display} ({elapsed}s)"));
    append_run_log(
        "info",
        "record.job.succeeded",
        json!({ "script": rel_display, "elapsed_secs": elapsed }),
    );
    JobResult {
        path: rel_display,
        success: true,
    }
}

/// Best-effort move of the produced artifact from the root into the job's
/// images directory. A no-op when the script wrote it there directly, when
/// no `Output` header was declared, or when nothing was produced.
fn relocate_artifact(job: &Job, env: &RecordEnv, fs: &dyn FileSystem) {
    let Some(name) = &job.output_name else {
        return;
    };
    let generated = env.root.join(name);
    let target = job.images_dir.join(name);
    if generated == target || !fs.exists(&generated) {
        return;
    }
    if let Err(error) = fs.rename(&generated, &target) {
        append_run_log(
            "warn",
            "record.relocate.failed",
            json!({
                "from": generated.display().to_string(),
                "to": target.display().to_string(),
                "error": error.to_string()
            }),
        );
    }
}

/// Records every discovered script through the bounded pool. The shim is
/// torn down and the on-air flag restored on every exit path, in that order.
#[allow(clippy::too_many_arguments)]
pub fn record_all(
    cfg: &AppConfig,
    root: &Path,
    selectors: &[String],
    current_path: &str,
    fs: &dyn FileSystem,
    runner: &dyn ProcessRunner,
    clock: &dyn Clock,
    terminal: &dyn Terminal,
) -> Result<i32, TapedeckError> {
    terminal.write_line("🎬 generating demos...")?;
    terminal.write_line("")?;
    if !selectors.is_empty() {
        terminal.write_line(&format!("chapters: {}", selectors.join(", ")))?;
    }
    terminal.write_line(&format!("concurrency: {}", cfg.recording.concurrency))?;
    terminal.write_line("")?;

    let jobs = discover_scripts(fs, root, cfg, selectors)?;
    if jobs.is_empty() {
        terminal.write_line("no script files found")?;
        return Ok(0);
    }

    terminal.write_line(&format!("found {} script file(s):", jobs.len()))?;
    for job in &jobs {
        let rel = job
            .script_path
            .strip_prefix(root)
            .unwrap_or(&job.script_path);
        terminal.write_line(&format!("  - {}", rel.display()))?;
    }
    terminal.write_line("")?;

    let guard = OnAirGuard::new(fs, cfg.tool_state.config_path.clone());
    let token = guard.engage(terminal);

    let started = clock.now();
    let batch = record_batch(cfg, root, &jobs, current_path, fs, runner, clock, terminal);
    guard.restore(token, terminal);
    let results = batch?;
    let total_secs = clock
        .now()
        .duration_since(started)
        .unwrap_or_default()
        .as_secs();

    let succeeded = results.iter().filter(|result| result.success).count();
    let failed = results
        .iter()
        .filter(|result| !result.success)
        .collect::<Vec<_>>();

    terminal.write_line("")?;
    terminal.write_line(RULE)?;
    terminal.write_line(&format!("✓ success: {succeeded}"))?;
    if !failed.is_empty() {
        terminal.write_line(&format!("✗ failed:  {}", failed.len()))?;
        for result in &failed {
            terminal.write_line(&format!("  - {}", result.path))?;
        }
    }
    terminal.write_line(&format!("⏱ total:   {total_secs}s"))?;
    terminal.write_line(RULE)?;

    append_run_log(
        "info",
        "record.batch.finished",
        json!({
            "jobs": results.len(),
            "succeeded": succeeded,
            "failed": failed.len(),
            "total_secs": total_secs
        }),
    );
    // Batch failures are summarized, not propagated; stricter callers can
    // inspect the printed summary or the run log.
    Ok(0)
}

#[allow(clippy::too_many_arguments)]
fn record_batch(
    cfg: &AppConfig,
    root: &Path,
    jobs: &[Job],
    current_path: &str,
    fs: &dyn FileSystem,
    runner: &dyn ProcessRunner,
    clock: &dyn Clock,
    terminal: &dyn Terminal,
) -> Result<Vec<JobResult>, TapedeckError> {
    let shim = install_shim(fs, runner, root, &cfg.shim, current_path)?;
    let _ = terminal.write_line(&format!(
        "{} shim: {} injected via PATH",
        cfg.shim.command,
        cfg.shim.inject_flags.join(" ")
    ));
    let _ = terminal.write_line(&format!(
        "recording {} demos ({} at a time)...",
        jobs.len(),
        cfg.recording.concurrency
    ));
    let _ = terminal.write_line("");

    let env = RecordEnv {
        root: root.to_path_buf(),
        path_value: shim.path_value.clone(),
    };
    let recording = &cfg.recording;
    let tasks = jobs
        .iter()
        .map(|job| {
            let env = env.clone();
            move || run_recording(job, &env, recording, fs, runner, clock, terminal)
        })
        .collect::<Vec<_>>();

    let results = run_bounded(tasks, cfg.recording.concurrency as usize);
    remove_shim(fs, &shim);
    Ok(results)
}
