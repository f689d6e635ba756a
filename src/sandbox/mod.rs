pub mod process;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use process::{ProcessSandbox, SandboxConfig};

/// How a sandboxed run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStatus {
    /// The interpreter exited on its own (exit code is deliberately not kept).
    Completed,
    /// The run hit its deadline and the process was killed.
    TimedOut { limit: Duration },
}

/// Captured result of one execution attempt.
///
/// Success is decided by `diagnostic_text` alone: an empty stderr is a
/// success whatever the exit code, and any stderr output (even a harmless
/// warning) is a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub diagnostic_text: String,
    pub status: ExecutionStatus,
}

impl ExecutionResult {
    pub fn completed(stderr: &str) -> Self {
        Self {
            diagnostic_text: stderr.trim().to_string(),
            status: ExecutionStatus::Completed,
        }
    }

    pub fn timed_out(limit: Duration) -> Self {
        Self {
            diagnostic_text: format!(
                "Execution timed out after {} seconds and was terminated.",
                limit.as_secs_f64()
            ),
            status: ExecutionStatus::TimedOut { limit },
        }
    }

    pub fn is_success(&self) -> bool {
        self.diagnostic_text.is_empty()
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.status, ExecutionStatus::TimedOut { .. })
    }
}

/// Infrastructure failures. These are never routed through classification.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Failed to prepare sandbox workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("Interpreter not found: {0}")]
    InterpreterNotFound(String),

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for sandboxed process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Failed to read captured stderr: {0}")]
    Capture(#[source] std::io::Error),

    #[error("Execution was cancelled")]
    Cancelled,
}

/// Shared flag used to abort a running submission from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Re-arm the token so the next run can be cancelled again.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub trait Sandbox: Send + Sync {
    fn run(&self, code: &str, cancel: &CancelToken) -> Result<ExecutionResult, SandboxError>;
}
