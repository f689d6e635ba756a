use super::{CancelToken, ExecutionResult, Sandbox, SandboxError};
use std::fs::{self, File};
use std::io::ErrorKind;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_FILE: &str = "stderr.log";

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub interpreter: String,
    pub interpreter_args: Vec<String>,
    pub timeout: Duration,
    pub file_extension: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            interpreter_args: vec!["-I".to_string()],
            timeout: Duration::from_secs(10),
            file_extension: "py".to_string(),
        }
    }
}

/// Runs each submission in a child interpreter inside a fresh temp directory.
pub struct ProcessSandbox {
    config: SandboxConfig,
}

impl ProcessSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    fn source_file_name(&self) -> String {
        let ext = self.config.file_extension.trim_start_matches('.');
        if ext.is_empty() {
            "main".to_string()
        } else {
            format!("main.{}", ext)
        }
    }
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

/// Kill everything the submission started, not just the interpreter.
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    // SAFETY: kill(2) takes plain integers. The child was spawned as the
    // leader of its own group, so -pid addresses only that group.
    let rc = unsafe { libc::kill(-(child.id() as libc::pid_t), libc::SIGKILL) };
    if rc != 0 {
        log::debug!(
            "process group {} already gone: {}",
            child.id(),
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

fn terminate(child: &mut Child) {
    kill_process_group(child);
    let _ = child.kill();
    let _ = child.wait();
}

impl Sandbox for ProcessSandbox {
    fn run(&self, code: &str, cancel: &CancelToken) -> Result<ExecutionResult, SandboxError> {
        // Dropping the TempDir removes the source and the captured stderr.
        let workspace = tempfile::Builder::new()
            .prefix("tracehint-")
            .tempdir()
            .map_err(SandboxError::Workspace)?;
        let source_path = workspace.path().join(self.source_file_name());
        fs::write(&source_path, code).map_err(SandboxError::Workspace)?;

        let stderr_path = workspace.path().join(STDERR_FILE);
        let stderr_file = File::create(&stderr_path).map_err(SandboxError::Workspace)?;

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.args(&self.config.interpreter_args)
            .arg(&source_path)
            .current_dir(workspace.path())
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_file));
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        // Own process group: the terminal's Ctrl+C reaches only us, and the
        // whole tree can be killed at once.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        log::debug!(
            "spawning {} on {} (timeout {:?})",
            self.config.interpreter,
            source_path.display(),
            self.config.timeout
        );

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                SandboxError::InterpreterNotFound(self.config.interpreter.clone())
            } else {
                SandboxError::Spawn {
                    program: self.config.interpreter.clone(),
                    source: e,
                }
            }
        })?;

        let started = Instant::now();
        loop {
            if cancel.is_cancelled() {
                terminate(&mut child);
                log::warn!("submission cancelled after {:?}", started.elapsed());
                return Err(SandboxError::Cancelled);
            }

            let elapsed = started.elapsed();
            if elapsed >= self.config.timeout {
                terminate(&mut child);
                log::warn!("submission timed out after {:?}", self.config.timeout);
                return Ok(ExecutionResult::timed_out(self.config.timeout));
            }

            let slice = POLL_INTERVAL.min(self.config.timeout - elapsed);
            match child.wait_timeout(slice) {
                Ok(Some(status)) => {
                    log::debug!(
                        "interpreter exited with {} after {:?}",
                        status,
                        started.elapsed()
                    );
                    break;
                }
                Ok(None) => continue,
                Err(e) => {
                    terminate(&mut child);
                    return Err(SandboxError::Wait(e));
                }
            }
        }

        // Background jobs left behind by the submission die with it.
        kill_process_group(&child);

        let stderr = fs::read(&stderr_path).map_err(SandboxError::Capture)?;
        Ok(ExecutionResult::completed(&String::from_utf8_lossy(&stderr)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ExecutionStatus;
    use std::path::Path;
    use std::thread;

    fn sh_sandbox(timeout: Duration) -> ProcessSandbox {
        ProcessSandbox::new(SandboxConfig {
            interpreter: "sh".to_string(),
            interpreter_args: Vec::new(),
            timeout,
            file_extension: "sh".to_string(),
        })
    }

    #[test]
    fn test_stdout_only_is_success() {
        let sandbox = sh_sandbox(Duration::from_secs(5));
        let result = sandbox.run("echo hello", &CancelToken::new()).unwrap();
        assert!(result.is_success());
        assert_eq!(result.status, ExecutionStatus::Completed);
    }

    #[test]
    fn test_stderr_is_captured_and_trimmed() {
        let sandbox = sh_sandbox(Duration::from_secs(5));
        let result = sandbox
            .run("echo out; echo '  boom  ' >&2; exit 3", &CancelToken::new())
            .unwrap();
        assert_eq!(result.diagnostic_text, "boom");
    }

    #[test]
    fn test_nonzero_exit_without_stderr_is_success() {
        let sandbox = sh_sandbox(Duration::from_secs(5));
        let result = sandbox.run("exit 1", &CancelToken::new()).unwrap();
        assert!(result.is_success());
    }

    #[test]
    fn test_stderr_with_zero_exit_is_failure() {
        let sandbox = sh_sandbox(Duration::from_secs(5));
        let result = sandbox
            .run("echo 'just a warning' >&2", &CancelToken::new())
            .unwrap();
        assert!(!result.is_success());
        assert_eq!(result.diagnostic_text, "just a warning");
    }

    #[test]
    fn test_large_stderr_does_not_stall() {
        let sandbox = sh_sandbox(Duration::from_secs(10));
        let result = sandbox
            .run("i=0; while [ $i -lt 20000 ]; do echo line$i >&2; i=$((i+1)); done", &CancelToken::new())
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.diagnostic_text.lines().count(), 20000);
    }

    #[test]
    fn test_timeout_kills_process() {
        let sandbox = sh_sandbox(Duration::from_millis(300));
        let start = Instant::now();
        let result = sandbox.run("sleep 5", &CancelToken::new()).unwrap();
        assert!(result.is_timeout());
        assert!(!result.is_success());
        assert!(result.diagnostic_text.contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let sandbox = sh_sandbox(Duration::from_secs(10));
        let token = CancelToken::new();
        let remote = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            remote.cancel();
        });
        let start = Instant::now();
        let result = sandbox.run("sleep 5", &token);
        handle.join().unwrap();
        assert!(matches!(result, Err(SandboxError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_interpreter_is_infrastructure_error() {
        let sandbox = ProcessSandbox::new(SandboxConfig {
            interpreter: "tracehint-no-such-interpreter".to_string(),
            ..SandboxConfig::default()
        });
        let result = sandbox.run("print(1)", &CancelToken::new());
        assert!(matches!(result, Err(SandboxError::InterpreterNotFound(_))));
    }

    #[test]
    fn test_environment_is_not_inherited() {
        std::env::set_var("TRACEHINT_LEAK_CHECK", "visible");
        let sandbox = sh_sandbox(Duration::from_secs(5));
        let result = sandbox
            .run("echo \"leak=$TRACEHINT_LEAK_CHECK\" >&2", &CancelToken::new())
            .unwrap();
        assert_eq!(result.diagnostic_text, "leak=");
    }

    fn read_marker(marker: &Path) -> String {
        fs::read_to_string(marker).unwrap().trim().to_string()
    }

    #[cfg(target_os = "linux")]
    fn process_is_gone(pid: &str) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            // A reaped process has no /proc entry; an unreaped one shows state Z.
            let gone = match fs::read_to_string(format!("/proc/{}/stat", pid)) {
                Ok(stat) => stat
                    .rsplit_once(')')
                    .map(|(_, rest)| rest.trim_start().starts_with('Z'))
                    .unwrap_or(false),
                Err(_) => true,
            };
            if gone || Instant::now() >= deadline {
                return gone;
            }
            thread::sleep(Duration::from_millis(50));
        }
    }

    #[test]
    fn test_workspace_removed_after_success() {
        let sandbox = sh_sandbox(Duration::from_secs(5));
        let result = sandbox.run("pwd >&2", &CancelToken::new()).unwrap();
        let workspace = result.diagnostic_text;
        assert!(workspace.contains("tracehint-"), "workspace: {}", workspace);
        assert!(!Path::new(&workspace).exists());
    }

    #[test]
    fn test_workspace_removed_after_timeout() {
        let marker = tempfile::NamedTempFile::new().unwrap();
        let sandbox = sh_sandbox(Duration::from_millis(500));
        let code = format!("pwd > '{}'; sleep 5", marker.path().display());
        let result = sandbox.run(&code, &CancelToken::new()).unwrap();
        assert!(result.is_timeout());

        let workspace = read_marker(marker.path());
        assert!(workspace.contains("tracehint-"), "workspace: {}", workspace);
        assert!(!Path::new(&workspace).exists());
    }

    #[test]
    fn test_workspace_removed_after_cancel() {
        let marker = tempfile::NamedTempFile::new().unwrap();
        let sandbox = sh_sandbox(Duration::from_secs(10));
        let token = CancelToken::new();
        let remote = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(500));
            remote.cancel();
        });
        let code = format!("pwd > '{}'; sleep 5", marker.path().display());
        let result = sandbox.run(&code, &token);
        handle.join().unwrap();
        assert!(matches!(result, Err(SandboxError::Cancelled)));

        let workspace = read_marker(marker.path());
        assert!(workspace.contains("tracehint-"), "workspace: {}", workspace);
        assert!(!Path::new(&workspace).exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_timeout_kills_background_children() {
        let marker = tempfile::NamedTempFile::new().unwrap();
        let sandbox = sh_sandbox(Duration::from_millis(300));
        let code = format!("sleep 47 & echo $! > '{}'; wait", marker.path().display());
        let result = sandbox.run(&code, &CancelToken::new()).unwrap();
        assert!(result.is_timeout());

        let pid = read_marker(marker.path());
        assert!(!pid.is_empty());
        assert!(process_is_gone(&pid), "background sleep {} survived", pid);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_background_children_do_not_outlive_a_finished_run() {
        let marker = tempfile::NamedTempFile::new().unwrap();
        let sandbox = sh_sandbox(Duration::from_secs(5));
        let code = format!("sleep 47 & echo $! > '{}'", marker.path().display());
        let result = sandbox.run(&code, &CancelToken::new()).unwrap();
        assert!(result.is_success());

        let pid = read_marker(marker.path());
        assert!(process_is_gone(&pid), "background sleep {} survived", pid);
    }

    #[test]
    fn test_source_file_name_uses_extension() {
        let sandbox = ProcessSandbox::default();
        assert_eq!(sandbox.source_file_name(), "main.py");

        let sandbox = ProcessSandbox::new(SandboxConfig {
            file_extension: ".rb".to_string(),
            ..SandboxConfig::default()
        });
        assert_eq!(sandbox.source_file_name(), "main.rb");
    }
}
