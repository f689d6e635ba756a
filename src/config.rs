use crate::classifier::{ArtifactError, ErrorClassifier};
use crate::sandbox::SandboxConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub sandbox: SandboxSection,
    #[serde(default)]
    pub model: ModelSection,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SandboxSection {
    pub interpreter: String,
    pub interpreter_args: Vec<String>,
    pub timeout_secs: u64,
    pub file_extension: String,
}

/// Paths to external artifacts. When both are unset the model compiled into
/// the binary is used, so the tool works from any directory.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ModelSection {
    #[serde(default)]
    pub vectorizer_path: Option<String>,
    #[serde(default)]
    pub classifier_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sandbox: SandboxSection {
                interpreter: "python3".to_string(),
                interpreter_args: vec!["-I".to_string()],
                timeout_secs: 10,
                file_extension: "py".to_string(),
            },
            model: ModelSection::default(),
        }
    }
}

impl Config {
    /// Parse config from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".tracehint").join("config.toml"))
    }

    /// Load config from ~/.tracehint/config.toml, falling back to defaults.
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load config from `path`. A missing file means defaults; an unreadable
    /// or invalid one is reported and also yields defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml(&contents) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!(
                        "Failed to parse {}: {}. Using defaults.",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            interpreter: self.sandbox.interpreter.clone(),
            interpreter_args: self.sandbox.interpreter_args.clone(),
            timeout: Duration::from_secs(self.sandbox.timeout_secs),
            file_extension: self.sandbox.file_extension.clone(),
        }
    }

    pub fn vectorizer_path(&self) -> Option<PathBuf> {
        self.model
            .vectorizer_path
            .as_deref()
            .map(|p| PathBuf::from(expand_tilde(p)))
    }

    pub fn classifier_path(&self) -> Option<PathBuf> {
        self.model
            .classifier_path
            .as_deref()
            .map(|p| PathBuf::from(expand_tilde(p)))
    }

    /// Load the configured artifacts, or the bundled model when none are set.
    pub fn load_classifier(&self) -> Result<ErrorClassifier, ArtifactError> {
        match (self.vectorizer_path(), self.classifier_path()) {
            (Some(vectorizer), Some(classifier)) => ErrorClassifier::load(&vectorizer, &classifier),
            (None, None) => ErrorClassifier::bundled(),
            (Some(path), None) | (None, Some(path)) => Err(ArtifactError::Invalid {
                path,
                reason: "vectorizer_path and classifier_path must be set together".to_string(),
            }),
        }
    }
}

fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).display().to_string();
        }
    }
    path.to_string()
}
