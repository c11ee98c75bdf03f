use crate::config::ShimConfig;
use crate::errors::TapedeckError;
use crate::logging::append_run_log;
use crate::runtime::{FileSystem, ProcessRequest, ProcessRunner};
use serde_json::json;
use std::path::{Path, PathBuf};

/// A PATH prepend that transparently upgrades every bare invocation of the
/// target command for the duration of a recording batch. The scripts stay
/// clean; the flags ride along underneath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimEnv {
    pub dir: PathBuf,
    pub path_value: String,
}

pub fn install_shim(
    fs: &dyn FileSystem,
    runner: &dyn ProcessRunner,
    root: &Path,
    cfg: &ShimConfig,
    current_path: &str,
) -> Result<ShimEnv, TapedeckError> {
    let real_binary = resolve_real_binary(runner, &cfg.command)?;
    let dir = root.join(&cfg.dir_name);
    fs.create_dir_all(&dir)?;

    let shim_path = dir.join(&cfg.command);
    let flags = cfg.inject_flags.join(" ");
    let script = format!("#!/bin/bash\nexec \"{real_binary}\" {flags} \"$@\"\n");
    fs.write_string(&shim_path, &script)?;
    fs.set_executable(&shim_path)?;

    append_run_log(
        "info",
        "shim.installed",
        json!({
            "command": cfg.command,
            "real_binary": real_binary,
            "dir": dir.display().to_string()
        }),
    );

    Ok(ShimEnv {
        path_value: format!("{}:{current_path}", dir.display()),
        dir,
    })
}

/// Removal tolerates a shim that was already cleaned up or never written.
pub fn remove_shim(fs: &dyn FileSystem, shim: &ShimEnv) {
    if let Err(error) = fs.remove_dir_all(&shim.dir) {
        append_run_log(
            "debug",
            "shim.remove_skipped",
            json!({ "dir": shim.dir.display().to_string(), "error": error.to_string() }),
        );
    }
}

/// Recording cannot proceed without the real executable on the search path.
fn resolve_real_binary(
    runner: &dyn ProcessRunner,
    command: &str,
) -> Result<String, TapedeckError> {
    let out = runner.run(ProcessRequest::new("which", vec![command.to_string()]))?;
    if out.exit_code != 0 {
        return Err(TapedeckError::Process(format!(
            "{command} not found on PATH; recording requires it"
        )));
    }
    let resolved = out.stdout.trim().to_string();
    if resolved.is_empty() {
        return Err(TapedeckError::Process(format!(
            "{command} not found on PATH; recording requires it"
        )));
    }
    Ok(resolved)
}

pub fn resolve_tool(runner: &dyn ProcessRunner, command: &str) -> Result<(), TapedeckError> {
    let out = runner.run(ProcessRequest::new("which", vec![command.to_string()]))?;
    if out.exit_code != 0 || out.stdout.trim().is_empty() {
        return Err(TapedeckError::Process(format!(
            "{command} is required but was not found on PATH"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{install_shim, remove_shim, resolve_tool};
    use crate::config::AppConfig;
    use crate::runtime::{FakeFileSystem, FakeProcessRunner, FileSystem};
    use std::path::Path;

    #[test]
    fn shim_script_execs_the_real_binary_with_injected_flags() {
        let fs = FakeFileSystem::default();
        let runner = FakeProcessRunner::default();
        runner.push_success("/usr/local/bin/copilot\n");

        let cfg = AppConfig::default();
        let shim = install_shim(&fs, &runner, Path::new("/course"), &cfg.shim, "/usr/bin:/bin")
            .expect("install");

        assert_eq!(shim.path_value, "/course/.tapedeck-shim:/usr/bin:/bin");
        let script = fs
            .file_contents(Path::new("/course/.tapedeck-shim/copilot"))
            .expect("script written");
        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script
            .contains("exec \"/usr/local/bin/copilot\" --yolo --allow-all-paths \"$@\""));
        assert_eq!(
            fs.executable_paths(),
            vec![Path::new("/course/.tapedeck-shim/copilot").to_path_buf()]
        );

        let which = &runner.requests()[0];
        assert_eq!(which.program, "which");
        assert_eq!(which.args, vec!["copilot".to_string()]);
    }

    #[test]
    fn missing_real_binary_is_fatal() {
        let fs = FakeFileSystem::default();
        let runner = FakeProcessRunner::default();
        runner.push_failure(1, "");

        let cfg = AppConfig::default();
        let error = install_shim(&fs, &runner, Path::new("/course"), &cfg.shim, "/bin")
            .expect_err("must fail");
        assert!(error.to_string().contains("copilot not found"));
    }

    #[test]
    fn removal_tolerates_absent_directory() {
        let fs = FakeFileSystem::default();
        let runner = FakeProcessRunner::default();
        runner.push_success("/usr/local/bin/copilot\n");

        let cfg = AppConfig::default();
        let shim = install_shim(&fs, &runner, Path::new("/course"), &cfg.shim, "/bin")
            .expect("install");
        remove_shim(&fs, &shim);
        assert!(!fs.exists(Path::new("/course/.tapedeck-shim/copilot")));
        // Second removal is a quiet no-op.
        remove_shim(&fs, &shim);
    }

    #[test]
    fn resolve_tool_distinguishes_present_and_missing() {
        let runner = FakeProcessRunner::default();
        runner.push_success("/usr/bin/tesseract\n");
        assert!(resolve_tool(&runner, "tesseract").is_ok());

        runner.push_failure(1, "");
        assert!(resolve_tool(&runner, "ffprobe").is_err());
    }
}
