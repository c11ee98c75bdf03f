use crate::logging::append_run_log;
use crate::runtime::{FileSystem, Terminal};
use serde_json::{json, Value};
use std::path::PathBuf;

const ON_AIR_FIELD: &str = "on_air_mode";

/// Scoped toggle of the external tool's broadcast-safe flag. The flag is
/// flipped on for the whole batch and restored once at the end; the token
/// records whether a restore is owed.
pub struct OnAirGuard<'a> {
    fs: &'a dyn FileSystem,
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnAirToken {
    must_restore: bool,
}

impl OnAirToken {
    pub fn must_restore(&self) -> bool {
        self.must_restore
    }
}

impl<'a> OnAirGuard<'a> {
    pub fn new(fs: &'a dyn FileSystem, config_path: Option<PathBuf>) -> Self {
        Self { fs, config_path }
    }

    /// Reads the flag and flips it on if needed. All failures are warnings:
    /// an unreadable or malformed config is treated as already-on and the
    /// returned token owes no restore.
    pub fn engage(&self, terminal: &dyn Terminal) -> OnAirToken {
        let Some(path) = &self.config_path else {
            let _ = terminal.write_line("⚠ tool config path unknown, on-air mode not verified");
            return OnAirToken {
                must_restore: false,
            };
        };
        let mut config = match self.read_config() {
            Some(config) => config,
            None => {
                let _ =
                    terminal.write_line("⚠ could not read tool config, on-air mode not verified");
                append_run_log(
                    "warn",
                    "tool_state.engage.unreadable",
                    json!({ "path": path.display().to_string() }),
                );
                return OnAirToken {
                    must_restore: false,
                };
            }
        };

        if config
            .get(ON_AIR_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            let _ = terminal.write_line("🔴 on-air mode: already enabled");
            return OnAirToken {
                must_restore: false,
            };
        }

        config[ON_AIR_FIELD] = Value::Bool(true);
        match self.write_config(&config) {
            Ok(()) => {
                let _ = terminal.write_line("🔴 on-air mode: enabled (was off)");
                append_run_log(
                    "info",
                    "tool_state.engage.flipped",
                    json!({ "path": path.display().to_string() }),
                );
                OnAirToken { must_restore: true }
            }
            Err(error) => {
                let _ = terminal
                    .write_line("⚠ could not update tool config, on-air mode not verified");
                append_run_log(
                    "warn",
                    "tool_state.engage.write_failed",
                    json!({ "path": path.display().to_string(), "error": error.to_string() }),
                );
                OnAirToken {
                    must_restore: false,
                }
            }
        }
    }

    /// Restores the flag to off when the token owes it. Invoked on every exit
    /// path of an orchestration run; failures are logged, never raised.
    pub fn restore(&self, token: OnAirToken, terminal: &dyn Terminal) {
        if !token.must_restore {
            return;
        }
        let Some(config) = self.read_config() else {
            append_run_log("warn", "tool_state.restore.unreadable", json!({}));
            return;
        };
        let mut config = config;
        config[ON_AIR_FIELD] = Value::Bool(false);
        match self.write_config(&config) {
            Ok(()) => {
                let _ = terminal.write_line("🔴 on-air mode: restored to off");
            }
            Err(error) => {
                append_run_log(
                    "warn",
                    "tool_state.restore.write_failed",
                    json!({ "error": error.to_string() }),
                );
            }
        }
    }

    fn read_config(&self) -> Option<Value> {
        let path = self.config_path.as_ref()?;
        let contents = self.fs.read_to_string(path).ok()?;
        let value: Value = serde_json::from_str(&contents).ok()?;
        value.is_object().then_some(value)
    }

    fn write_config(&self, config: &Value) -> Result<(), crate::errors::TapedeckError> {
        let path = self
            .config_path
            .as_ref()
            .ok_or_else(|| crate::errors::TapedeckError::Io("no config path".to_string()))?;
        let rendered = serde_json::to_string_pretty(config)
            .map_err(|e| crate::errors::TapedeckError::Io(e.to_string()))?;
        self.fs.write_string(path, &format!("{rendered}\n"))
    }
}
