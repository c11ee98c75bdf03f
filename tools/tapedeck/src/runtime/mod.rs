use crate::errors::TapedeckError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Environment overrides applied on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl ProcessRequest {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            env: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

pub trait ProcessRunner: Send + Sync {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, TapedeckError>;

    /// Run with a hard wall-clock deadline. The child is killed once the
    /// deadline expires and the call reports a process error.
    fn run_with_timeout(
        &self,
        request: ProcessRequest,
        timeout: Duration,
    ) -> Result<ProcessOutput, TapedeckError>;
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, TapedeckError>;
    fn write_string(&self, path: &Path, contents: &str) -> Result<(), TapedeckError>;
    fn create_dir_all(&self, path: &Path) -> Result<(), TapedeckError>;
    fn remove_file(&self, path: &Path) -> Result<(), TapedeckError>;
    fn remove_dir_all(&self, path: &Path) -> Result<(), TapedeckError>;
    fn rename(&self, from: &Path, to: &Path) -> Result<(), TapedeckError>;
    fn set_executable(&self, path: &Path) -> Result<(), TapedeckError>;
    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, TapedeckError>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
}

pub trait Terminal: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), TapedeckError>;
}

pub struct ProductionClock;

impl Clock for ProductionClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, TapedeckError> {
        std::fs::read_to_string(path).map_err(|e| TapedeckError::Io(e.to_string()))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), TapedeckError> {
        std::fs::write(path, contents).map_err(|e| TapedeckError::Io(e.to_string()))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), TapedeckError> {
        std::fs::create_dir_all(path).map_err(|e| TapedeckError::Io(e.to_string()))
    }

    fn remove_file(&self, path: &Path) -> Result<(), TapedeckError> {
        std::fs::remove_file(path).map_err(|e| TapedeckError::Io(e.to_string()))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), TapedeckError> {
        std::fs::remove_dir_all(path).map_err(|e| TapedeckError::Io(e.to_string()))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), TapedeckError> {
        std::fs::rename(from, to).map_err(|e| TapedeckError::Io(e.to_string()))
    }

    fn set_executable(&self, path: &Path) -> Result<(), TapedeckError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
                .map_err(|e| TapedeckError::Io(e.to_string()))
        }
        #[cfg(not(unix))]
        {
            let _ = path;
            Ok(())
        }
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, TapedeckError> {
        let mut entries = std::fs::read_dir(path)
            .map_err(|e| TapedeckError::Io(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect::<Vec<_>>();
        entries.sort();
        Ok(entries)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ProductionProcessRunner;

impl ProductionProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn command_for(request: &ProcessRequest) -> std::process::Command {
        let mut cmd = std::process::Command::new(&request.program);
        cmd.args(&request.args);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        cmd
    }
}

impl Default for ProductionProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner for ProductionProcessRunner {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, TapedeckError> {
        let output = Self::command_for(&request)
            .output()
            .map_err(|e| TapedeckError::Process(e.to_string()))?;
        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn run_with_timeout(
        &self,
        request: ProcessRequest,
        timeout: Duration,
    ) -> Result<ProcessOutput, TapedeckError> {
        let mut cmd = Self::command_for(&request);
        cmd.stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| TapedeckError::Process(e.to_string()))?;
        // Drain both pipes off-thread so a chatty child never fills the pipe
        // buffer and stalls short of exiting.
        let stdout_reader = drain_pipe(child.stdout.take());
        let stderr_reader = drain_pipe(child.stderr.take());
        let deadline = std::time::Instant::now() + timeout;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Ok(ProcessOutput {
                        exit_code: status.code().unwrap_or(-1),
                        stdout: stdout_reader.join().unwrap_or_default(),
                        stderr: stderr_reader.join().unwrap_or_default(),
                    });
                }
                Ok(None) => {
                    if std::time::Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = stdout_reader.join();
                        let _ = stderr_reader.join();
                        return Err(TapedeckError::Process(format!(
                            "{} timed out after {}s",
                            request.program,
                            timeout.as_secs()
                        )));
                    }
                    std::thread::sleep(WAIT_POLL_INTERVAL);
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_reader.join();
                    let _ = stderr_reader.join();
                    return Err(TapedeckError::Process(e.to_string()));
                }
            }
        }
    }
}

fn drain_pipe<R>(pipe: Option<R>) -> std::thread::JoinHandle<String>
where
    R: std::io::Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Some(mut pipe) = pipe {
            use std::io::Read;
            let _ = pipe.read_to_end(&mut bytes);
        }
        String::from_utf8_lossy(&bytes).to_string()
    })
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn write_line(&self, line: &str) -> Result<(), TapedeckError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| TapedeckError::Io(e.to_string()))
    }
}

pub struct ProductionRuntime {
    pub clock: Arc<dyn Clock>,
    pub file_system: Arc<dyn FileSystem>,
    pub process_runner: Arc<dyn ProcessRunner>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ProductionClock),
            file_system: Arc::new(ProductionFileSystem),
            process_runner: Arc::new(ProductionProcessRunner::new()),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-step clock for deterministic elapsed-time assertions.
#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<SystemTime>>,
    step: Duration,
}

impl FakeClock {
    pub fn new(now: SystemTime, step: Duration) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
            step,
        }
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH, Duration::ZERO)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        let mut now = self.now.lock().expect("clock lock");
        let current = *now;
        *now += self.step;
        current
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
    dirs: Arc<Mutex<Vec<PathBuf>>>,
    executable: Arc<Mutex<Vec<PathBuf>>>,
    fail_next: Arc<Mutex<Option<TapedeckError>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.insert_file(path, contents);
        fs
    }

    pub fn insert_file(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
    }

    pub fn insert_dir(&self, path: impl Into<PathBuf>) {
        self.dirs.lock().expect("dirs lock").push(path.into());
    }

    pub fn set_fail_next(&self, error: TapedeckError) {
        *self.fail_next.lock().expect("fail lock") = Some(error);
    }

    pub fn file_contents(&self, path: &Path) -> Option<String> {
        self.files.lock().expect("files lock").get(path).cloned()
    }

    pub fn executable_paths(&self) -> Vec<PathBuf> {
        self.executable.lock().expect("exec lock").clone()
    }

    fn maybe_fail(&self) -> Result<(), TapedeckError> {
        if let Some(err) = self.fail_next.lock().expect("fail lock").take() {
            return Err(err);
        }
        Ok(())
    }

    fn known_paths(&self) -> Vec<PathBuf> {
        let mut paths = self
            .files
            .lock()
            .expect("files lock")
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        paths.extend(self.dirs.lock().expect("dirs lock").iter().cloned());
        paths
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, TapedeckError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| TapedeckError::Io(format!("missing file {}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), TapedeckError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), TapedeckError> {
        self.maybe_fail()?;
        self.dirs.lock().expect("dirs lock").push(path.to_path_buf());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<(), TapedeckError> {
        self.maybe_fail()?;
        self.files.lock().expect("files lock").remove(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), TapedeckError> {
        self.maybe_fail()?;
        self.dirs
            .lock()
            .expect("dirs lock")
            .retain(|dir| !dir.starts_with(path));
        self.files
            .lock()
            .expect("files lock")
            .retain(|file, _| !file.starts_with(path));
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), TapedeckError> {
        self.maybe_fail()?;
        let mut files = self.files.lock().expect("files lock");
        let contents = files
            .remove(from)
            .ok_or_else(|| TapedeckError::Io(format!("missing file {}", from.display())))?;
        files.insert(to.to_path_buf(), contents);
        Ok(())
    }

    fn set_executable(&self, path: &Path) -> Result<(), TapedeckError> {
        self.maybe_fail()?;
        self.executable
            .lock()
            .expect("exec lock")
            .push(path.to_path_buf());
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, TapedeckError> {
        self.maybe_fail()?;
        let mut children = Vec::new();
        for known in self.known_paths() {
            let Ok(rest) = known.strip_prefix(path) else {
                continue;
            };
            let Some(first) = rest.components().next() else {
                continue;
            };
            let child = path.join(first);
            if !children.contains(&child) {
                children.push(child);
            }
        }
        children.sort();
        Ok(children)
    }

    fn exists(&self, path: &Path) -> bool {
        self.known_paths()
            .iter()
            .any(|known| known == path || known.starts_with(path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        if self.files.lock().expect("files lock").contains_key(path) {
            return false;
        }
        self.known_paths()
            .iter()
            .any(|known| known == path || known.starts_with(path))
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    writes: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }
}

impl Terminal for FakeTerminal {
    fn write_line(&self, line: &str) -> Result<(), TapedeckError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct FakeProcessRunner {
    responses: Arc<Mutex<Vec<Result<ProcessOutput, TapedeckError>>>>,
    requests: Arc<Mutex<Vec<ProcessRequest>>>,
}

impl FakeProcessRunner {
    pub fn push_response(&self, output: Result<ProcessOutput, TapedeckError>) {
        self.responses.lock().expect("responses lock").push(output);
    }

    pub fn push_success(&self, stdout: &str) {
        self.push_response(Ok(ProcessOutput {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }));
    }

    pub fn push_failure(&self, exit_code: i32, stderr: &str) {
        self.push_response(Ok(ProcessOutput {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }));
    }

    pub fn requests(&self) -> Vec<ProcessRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn next_response(&self, request: ProcessRequest) -> Result<ProcessOutput, TapedeckError> {
        self.requests.lock().expect("requests lock").push(request);
        let mut responses = self.responses.lock().expect("responses lock");
        if responses.is_empty() {
            return Err(TapedeckError::Process(
                "no fake response queued".to_string(),
            ));
        }
        responses.remove(0)
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, TapedeckError> {
        self.next_response(request)
    }

    fn run_with_timeout(
        &self,
        request: ProcessRequest,
        _timeout: Duration,
    ) -> Result<ProcessOutput, TapedeckError> {
        self.next_response(request)
    }
}
