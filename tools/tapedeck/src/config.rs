use crate::errors::TapedeckError;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub concurrency: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub discovery: DiscoveryConfig,
    pub recording: RecordingConfig,
    pub shim: ShimConfig,
    pub tool_state: ToolStateConfig,
    pub verify: VerifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub images_subdir: String,
    pub exclude_dirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordingConfig {
    pub recorder: String,
    pub script_suffix: String,
    pub concurrency: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShimConfig {
    pub command: String,
    pub inject_flags: Vec<String>,
    pub dir_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolStateConfig {
    /// Path of the external tool's JSON config. Defaults to
    /// `$HOME/.copilot/config.json` when unset.
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerifyConfig {
    pub artifact_suffix: String,
    pub frames_dir: PathBuf,
    pub probe: String,
    pub extractor: String,
    pub ocr: String,
    pub probe_timeout_seconds: u64,
    pub ocr_timeout_seconds: u64,
    pub failure_patterns: Vec<String>,
    pub success_patterns: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig {
                images_subdir: "images".to_string(),
                exclude_dirs: vec![
                    "node_modules".to_string(),
                    "scripts".to_string(),
                    "target".to_string(),
                ],
            },
            recording: RecordingConfig {
                recorder: "vhs".to_string(),
                script_suffix: ".tape".to_string(),
                concurrency: 5,
                timeout_seconds: 180,
            },
            shim: ShimConfig {
                command: "copilot".to_string(),
                inject_flags: vec!["--yolo".to_string(), "--allow-all-paths".to_string()],
                dir_name: ".tapedeck-shim".to_string(),
            },
            tool_state: ToolStateConfig { config_path: None },
            verify: VerifyConfig {
                artifact_suffix: "-demo.gif".to_string(),
                frames_dir: PathBuf::from("/tmp/tapedeck-last-frames"),
                probe: "ffprobe".to_string(),
                extractor: "ffmpeg".to_string(),
                ocr: "tesseract".to_string(),
                probe_timeout_seconds: 30,
                ocr_timeout_seconds: 15,
                failure_patterns: vec![
                    "operation cancelled by user".to_string(),
                    "ctrl+c again to exit".to_string(),
                    "thinking (esc to cancel".to_string(),
                ],
                success_patterns: vec![
                    "type @ to mention files".to_string(),
                    "remaining requests".to_string(),
                ],
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialAppConfig {
    discovery: Option<PartialDiscoveryConfig>,
    recording: Option<PartialRecordingConfig>,
    shim: Option<PartialShimConfig>,
    tool_state: Option<ToolStateConfig>,
    verify: Option<PartialVerifyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialDiscoveryConfig {
    images_subdir: Option<String>,
    exclude_dirs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialRecordingConfig {
    recorder: Option<String>,
    script_suffix: Option<String>,
    concurrency: Option<u32>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialShimConfig {
    command: Option<String>,
    inject_flags: Option<Vec<String>>,
    dir_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialVerifyConfig {
    artifact_suffix: Option<String>,
    frames_dir: Option<PathBuf>,
    probe: Option<String>,
    extractor: Option<String>,
    ocr: Option<String>,
    probe_timeout_seconds: Option<u64>,
    ocr_timeout_seconds: Option<u64>,
    failure_patterns: Option<Vec<String>>,
    success_patterns: Option<Vec<String>>,
}

pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<(AppConfig, PathBuf), TapedeckError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| TapedeckError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;

    let root = overrides
        .root
        .clone()
        .unwrap_or_else(|| process_cwd.to_path_buf());
    Ok((cfg, root))
}

/// Fill in the tool-state config path from the home directory when the
/// config file did not pin one.
pub fn resolve_tool_state_path(cfg: &mut AppConfig, home: Option<&Path>) {
    if cfg.tool_state.config_path.is_none() {
        cfg.tool_state.config_path = home.map(|home| home.join(".copilot/config.json"));
    }
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(discovery) = partial.discovery {
        if let Some(images_subdir) = discovery.images_subdir {
            cfg.discovery.images_subdir = images_subdir;
        }
        if let Some(exclude_dirs) = discovery.exclude_dirs {
            cfg.discovery.exclude_dirs = exclude_dirs;
        }
    }

    if let Some(recording) = partial.recording {
        if let Some(recorder) = recording.recorder {
            cfg.recording.recorder = recorder;
        }
        if let Some(script_suffix) = recording.script_suffix {
            cfg.recording.script_suffix = script_suffix;
        }
        if let Some(concurrency) = recording.concurrency {
            cfg.recording.concurrency = concurrency;
        }
        if let Some(timeout_seconds) = recording.timeout_seconds {
            cfg.recording.timeout_seconds = timeout_seconds;
        }
    }

    if let Some(shim) = partial.shim {
        if let Some(command) = shim.command {
            cfg.shim.command = command;
        }
        if let Some(inject_flags) = shim.inject_flags {
            cfg.shim.inject_flags = inject_flags;
        }
        if let Some(dir_name) = shim.dir_name {
            cfg.shim.dir_name = dir_name;
        }
    }

    if let Some(tool_state) = partial.tool_state {
        cfg.tool_state = tool_state;
    }

    if let Some(verify) = partial.verify {
        if let Some(artifact_suffix) = verify.artifact_suffix {
            cfg.verify.artifact_suffix = artifact_suffix;
        }
        if let Some(frames_dir) = verify.frames_dir {
            cfg.verify.frames_dir = frames_dir;
        }
        if let Some(probe) = verify.probe {
            cfg.verify.probe = probe;
        }
        if let Some(extractor) = verify.extractor {
            cfg.verify.extractor = extractor;
        }
        if let Some(ocr) = verify.ocr {
            cfg.verify.ocr = ocr;
        }
        if let Some(probe_timeout_seconds) = verify.probe_timeout_seconds {
            cfg.verify.probe_timeout_seconds = probe_timeout_seconds;
        }
        if let Some(ocr_timeout_seconds) = verify.ocr_timeout_seconds {
            cfg.verify.ocr_timeout_seconds = ocr_timeout_seconds;
        }
        if let Some(failure_patterns) = verify.failure_patterns {
            cfg.verify.failure_patterns = failure_patterns;
        }
        if let Some(success_patterns) = verify.success_patterns {
            cfg.verify.success_patterns = success_patterns;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(concurrency) = overrides.concurrency {
        cfg.recording.concurrency = concurrency;
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), TapedeckError> {
    if cfg.recording.concurrency == 0 {
        return Err(TapedeckError::InvalidConfig(
            "recording.concurrency must be at least 1".to_string(),
        ));
    }
    if cfg.recording.timeout_seconds == 0 {
        return Err(TapedeckError::InvalidConfig(
            "recording.timeout_seconds must be at least 1".to_string(),
        ));
    }
    if cfg.recording.script_suffix.is_empty() {
        return Err(TapedeckError::InvalidConfig(
            "recording.script_suffix must not be empty".to_string(),
        ));
    }
    if cfg.verify.artifact_suffix.is_empty() {
        return Err(TapedeckError::InvalidConfig(
            "verify.artifact_suffix must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{load_config, resolve_tool_state_path, AppConfig, CliOverrides};
    use crate::runtime::FakeFileSystem;
    use std::path::{Path, PathBuf};

    #[test]
    fn defaults_match_reference_tooling() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.recording.recorder, "vhs");
        assert_eq!(cfg.recording.concurrency, 5);
        assert_eq!(cfg.recording.timeout_seconds, 180);
        assert_eq!(cfg.verify.artifact_suffix, "-demo.gif");
        assert_eq!(cfg.verify.failure_patterns[0], "operation cancelled by user");
    }

    #[test]
    fn toml_sections_override_defaults() {
        let fs = FakeFileSystem::with_file(
            "/cfg/tapedeck.toml",
            "[recording]\nconcurrency = 2\n\n[verify]\nocr = \"my-ocr\"\n",
        );
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/cfg/tapedeck.toml")),
            ..CliOverrides::default()
        };
        let (cfg, root) = load_config(&overrides, Path::new("/work"), &fs).expect("load");
        assert_eq!(cfg.recording.concurrency, 2);
        assert_eq!(cfg.verify.ocr, "my-ocr");
        assert_eq!(cfg.recording.recorder, "vhs");
        assert_eq!(root, PathBuf::from("/work"));
    }

    #[test]
    fn cli_concurrency_wins_over_config_file() {
        let fs = FakeFileSystem::with_file("/cfg/tapedeck.toml", "[recording]\nconcurrency = 2\n");
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/cfg/tapedeck.toml")),
            concurrency: Some(7),
            ..CliOverrides::default()
        };
        let (cfg, _) = load_config(&overrides, Path::new("/work"), &fs).expect("load");
        assert_eq!(cfg.recording.concurrency, 7);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let fs = FakeFileSystem::default();
        let overrides = CliOverrides {
            concurrency: Some(0),
            ..CliOverrides::default()
        };
        assert!(load_config(&overrides, Path::new("/work"), &fs).is_err());
    }

    #[test]
    fn tool_state_path_defaults_under_home() {
        let mut cfg = AppConfig::default();
        resolve_tool_state_path(&mut cfg, Some(Path::new("/home/demo")));
        assert_eq!(
            cfg.tool_state.config_path,
            Some(PathBuf::from("/home/demo/.copilot/config.json"))
        );
    }

    #[test]
    fn pinned_tool_state_path_is_kept() {
        let mut cfg = AppConfig::default();
        cfg.tool_state.config_path = Some(PathBuf::from("/etc/copilot.json"));
        resolve_tool_state_path(&mut cfg, Some(Path::new("/home/demo")));
        assert_eq!(
            cfg.tool_state.config_path,
            Some(PathBuf::from("/etc/copilot.json"))
        );
    }
}
