pub mod classify;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod frame;
pub mod logging;
pub mod pool;
pub mod record;
pub mod runtime;
pub mod shim;
pub mod tool_state;
pub mod verify;

use clap::{error::ErrorKind, Parser, Subcommand};
use config::{load_config, resolve_tool_state_path, CliOverrides};
use errors::TapedeckError;
use runtime::ProductionRuntime;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "tapedeck")]
#[command(about = "Records scripted terminal demos and verifies the artifacts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Record every discovered demo script through the external recorder.
    Record {
        /// Only chapters whose directory name starts with or contains this
        /// value; repeatable.
        #[arg(long = "chapter")]
        chapters: Vec<String>,
        #[arg(long)]
        concurrency: Option<u32>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Check every recorded artifact's last frame for completion evidence.
    Verify {
        /// Keep the extracted last-frame stills instead of wiping them.
        #[arg(long, default_value_t = false)]
        save: bool,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

pub fn run() -> Result<i32, TapedeckError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let env = std::env::vars_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| TapedeckError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &env, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    env: &[(std::ffi::OsString, std::ffi::OsString)],
    cwd: &std::path::Path,
    runtime: &ProductionRuntime,
) -> Result<i32, TapedeckError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(TapedeckError::Cli(error.to_string())),
        },
    };

    let current_path = env_value(env, "PATH").unwrap_or_default();
    let home = env_value(env, "HOME").map(PathBuf::from);

    match cli.command {
        Command::Record {
            chapters,
            concurrency,
            config,
            root,
        } => {
            let overrides = CliOverrides {
                config_path: config,
                root,
                concurrency,
            };
            let (mut cfg, root) = load_config(&overrides, cwd, runtime.file_system.as_ref())?;
            resolve_tool_state_path(&mut cfg, home.as_deref());
            record::record_all(
                &cfg,
                &root,
                &chapters,
                &current_path,
                runtime.file_system.as_ref(),
                runtime.process_runner.as_ref(),
                runtime.clock.as_ref(),
                runtime.terminal.as_ref(),
            )
        }
        Command::Verify { save, config, root } => {
            let overrides = CliOverrides {
                config_path: config,
                root,
                concurrency: None,
            };
            let (cfg, root) = load_config(&overrides, cwd, runtime.file_system.as_ref())?;
            verify::verify_all(
                &cfg,
                &root,
                save,
                runtime.file_system.as_ref(),
                runtime.process_runner.as_ref(),
                runtime.terminal.as_ref(),
            )
        }
    }
}

fn env_value(
    env: &[(std::ffi::OsString, std::ffi::OsString)],
    key: &str,
) -> Option<String> {
    env.iter().find_map(|(name, value)| {
        (name.to_str() == Some(key)).then(|| value.to_string_lossy().to_string())
    })
}
