use crate::advisor;
use crate::classifier::{ErrorCategory, ErrorClassifier};
use crate::sandbox::{CancelToken, Sandbox, SandboxError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub diagnostic_text: String,
    pub category: ErrorCategory,
    pub remediation: String,
}

/// Exactly one of these is produced per accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Success,
    Failure(Failure),
}

impl AnalysisOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisOutcome::Success)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Please enter some code.")]
    EmptySubmission,

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl PipelineError {
    /// Validation problems are reported back to the user, not treated as crashes.
    pub fn is_validation(&self) -> bool {
        matches!(self, PipelineError::EmptySubmission)
    }
}

/// Runner -> Classifier -> Advisor, one attempt per submission.
pub struct Analyzer {
    sandbox: Box<dyn Sandbox>,
    classifier: Arc<ErrorClassifier>,
}

impl Analyzer {
    pub fn new(sandbox: Box<dyn Sandbox>, classifier: Arc<ErrorClassifier>) -> Self {
        Self {
            sandbox,
            classifier,
        }
    }

    pub fn analyze(&self, code: &str) -> Result<AnalysisOutcome, PipelineError> {
        self.analyze_with_cancel(code, &CancelToken::new())
    }

    pub fn analyze_with_cancel(
        &self,
        code: &str,
        cancel: &CancelToken,
    ) -> Result<AnalysisOutcome, PipelineError> {
        if code.trim().is_empty() {
            return Err(PipelineError::EmptySubmission);
        }

        let execution = self.sandbox.run(code, cancel)?;
        if execution.is_success() {
            return Ok(AnalysisOutcome::Success);
        }

        // The model has never seen a timeout message; skip it.
        let category = if execution.is_timeout() {
            ErrorCategory::other()
        } else {
            self.classifier.classify(&execution.diagnostic_text)
        };
        let remediation = advisor::advise(&category, &execution.diagnostic_text);

        Ok(AnalysisOutcome::Failure(Failure {
            diagnostic_text: execution.diagnostic_text,
            category,
            remediation,
        }))
    }

    /// Classify and advise on a traceback that was captured elsewhere.
    pub fn explain(&self, diagnostic_text: &str) -> Result<Failure, PipelineError> {
        let diagnostic_text = diagnostic_text.trim();
        if diagnostic_text.is_empty() {
            return Err(PipelineError::EmptySubmission);
        }
        let category = self.classifier.classify(diagnostic_text);
        let remediation = advisor::advise(&category, diagnostic_text);
        Ok(Failure {
            diagnostic_text: diagnostic_text.to_string(),
            category,
            remediation,
        })
    }
}
