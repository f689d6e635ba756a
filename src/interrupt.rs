//! Ctrl+C handling for the command-line front end.
//!
//! While a submission runs, SIGINT/SIGTERM cancel it through the shared
//! [`CancelToken`]. Outside of a run the signal ends the process as usual.

use crate::sandbox::CancelToken;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit code for a process stopped by Ctrl+C (128 + SIGINT).
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Clone, Default)]
pub struct Interrupts {
    token: CancelToken,
    running: Arc<AtomicBool>,
}

impl Interrupts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the process-wide signal handler. Can only succeed once per process.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let interrupts = self.clone();
        ctrlc::set_handler(move || {
            if !interrupts.on_signal() {
                std::process::exit(EXIT_INTERRUPTED);
            }
        })
    }

    /// Arm for a new submission and return the token the run should watch.
    pub fn begin(&self) -> CancelToken {
        self.token.reset();
        self.running.store(true, Ordering::SeqCst);
        self.token.clone()
    }

    pub fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Returns true when a running submission was cancelled, false when
    /// nothing was running and the caller should exit.
    pub fn on_signal(&self) -> bool {
        if self.running.load(Ordering::SeqCst) {
            log::debug!("interrupt received, cancelling the running submission");
            self.token.cancel();
            true
        } else {
            false
        }
    }
}
