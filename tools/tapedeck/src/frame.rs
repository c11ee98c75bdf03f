use crate::config::VerifyConfig;
use crate::logging::append_run_log;
use crate::runtime::{FileSystem, ProcessRequest, ProcessRunner};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

/// Probes an artifact's frame count and pulls its last frame out as a still,
/// shelling out to the configured probe and extractor binaries.
pub struct FrameProbe<'a> {
    runner: &'a dyn ProcessRunner,
    probe: String,
    extractor: String,
    timeout: Duration,
}

impl<'a> FrameProbe<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, cfg: &VerifyConfig) -> Self {
        Self {
            runner,
            probe: cfg.probe.clone(),
            extractor: cfg.extractor.clone(),
            timeout: Duration::from_secs(cfg.probe_timeout_seconds),
        }
    }

    /// Total decodable frames, or `None` when the probe fails or reports
    /// nothing usable.
    pub fn frame_count(&self, artifact: &Path) -> Option<i64> {
        let outcome = self.runner.run_with_timeout(
            ProcessRequest::new(
                self.probe.clone(),
                vec![
                    "-v".to_string(),
                    "error".to_string(),
                    "-count_frames".to_string(),
                    "-select_streams".to_string(),
                    "v:0".to_string(),
                    "-show_entries".to_string(),
                    "stream=nb_read_frames".to_string(),
                    "-of".to_string(),
                    "csv=p=0".to_string(),
                    artifact.display().to_string(),
                ],
            ),
            self.timeout,
        );
        let out = match outcome {
            Ok(out) if out.exit_code == 0 => out,
            Ok(out) => {
                append_run_log(
                    "debug",
                    "frame.probe.failed",
                    json!({
                        "artifact": artifact.display().to_string(),
                        "exit_code": out.exit_code,
                        "stderr": out.stderr
                    }),
                );
                return None;
            }
            Err(error) => {
                append_run_log(
                    "debug",
                    "frame.probe.failed",
                    json!({
                        "artifact": artifact.display().to_string(),
                        "error": error.to_string()
                    }),
                );
                return None;
            }
        };
        out.stdout.trim().parse::<i64>().ok()
    }

    /// Extracts frame `count - 1` to `still`. Zero frames or a failed probe
    /// is terminal for the artifact: no still is produced. Success means the
    /// target file actually exists afterwards.
    pub fn extract_last_frame(&self, fs: &dyn FileSystem, artifact: &Path, still: &Path) -> bool {
        let Some(frames) = self.frame_count(artifact) else {
            return false;
        };
        if frames <= 0 {
            return false;
        }
        let last = frames - 1;
        let outcome = self.runner.run_with_timeout(
            ProcessRequest::new(
                self.extractor.clone(),
                vec![
                    "-y".to_string(),
                    "-i".to_string(),
                    artifact.display().to_string(),
                    "-vf".to_string(),
                    format!("select=eq(n,{last})"),
                    "-frames:v".to_string(),
                    "1".to_string(),
                    still.display().to_string(),
                ],
            ),
            self.timeout,
        );
        match outcome {
            Ok(out) if out.exit_code == 0 => fs.exists(still),
            Ok(out) => {
                append_run_log(
                    "debug",
                    "frame.extract.failed",
                    json!({
                        "artifact": artifact.display().to_string(),
                        "exit_code": out.exit_code,
                        "stderr": out.stderr
                    }),
                );
                false
            }
            Err(error) => {
                append_run_log(
                    "debug",
                    "frame.extract.failed",
                    json!({
                        "artifact": artifact.display().to_string(),
                        "error": error.to_string()
                    }),
                );
                false
            }
        }
    }
}
