pub mod linear;
pub mod tfidf;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use linear::LinearModel;
pub use tfidf::TfidfVectorizer;

const BUNDLED_VECTORIZER: &str = include_str!("../../models/error_vectorizer.json");
const BUNDLED_CLASSIFIER: &str = include_str!("../../models/error_classifier.json");

/// Sparse feature vector: `(feature index, value)` pairs sorted by index.
pub type SparseVector = Vec<(usize, f64)>;

/// Label assigned to a traceback. Labels the model knows but this enum does
/// not are kept verbatim in `Other`. Build categories from model output with
/// [`ErrorCategory::from_label`]; `Other` can never hold a known label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCategory {
    SyntaxError,
    IndentationError,
    NameError,
    TypeError,
    ZeroDivisionError,
    IndexError,
    KeyError,
    AttributeError,
    ValueError,
    ModuleNotFoundError,
    FileNotFoundError,
    Other(UnknownLabel),
}

/// A label outside the known set. Only [`ErrorCategory::from_label`] creates one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnknownLabel(String);

impl UnknownLabel {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ErrorCategory {
    pub const KNOWN: [ErrorCategory; 11] = [
        ErrorCategory::SyntaxError,
        ErrorCategory::IndentationError,
        ErrorCategory::NameError,
        ErrorCategory::TypeError,
        ErrorCategory::ZeroDivisionError,
        ErrorCategory::IndexError,
        ErrorCategory::KeyError,
        ErrorCategory::AttributeError,
        ErrorCategory::ValueError,
        ErrorCategory::ModuleNotFoundError,
        ErrorCategory::FileNotFoundError,
    ];

    pub fn from_label(label: &str) -> Self {
        match label {
            "SyntaxError" => ErrorCategory::SyntaxError,
            "IndentationError" => ErrorCategory::IndentationError,
            "NameError" => ErrorCategory::NameError,
            "TypeError" => ErrorCategory::TypeError,
            "ZeroDivisionError" => ErrorCategory::ZeroDivisionError,
            "IndexError" => ErrorCategory::IndexError,
            "KeyError" => ErrorCategory::KeyError,
            "AttributeError" => ErrorCategory::AttributeError,
            "ValueError" => ErrorCategory::ValueError,
            "ModuleNotFoundError" => ErrorCategory::ModuleNotFoundError,
            "FileNotFoundError" => ErrorCategory::FileNotFoundError,
            other => ErrorCategory::Other(UnknownLabel(other.to_string())),
        }
    }

    /// The catch-all bucket used when the classifier is bypassed (timeouts).
    pub fn other() -> Self {
        ErrorCategory::Other(UnknownLabel("other".to_string()))
    }

    pub fn label(&self) -> &str {
        match self {
            ErrorCategory::SyntaxError => "SyntaxError",
            ErrorCategory::IndentationError => "IndentationError",
            ErrorCategory::NameError => "NameError",
            ErrorCategory::TypeError => "TypeError",
            ErrorCategory::ZeroDivisionError => "ZeroDivisionError",
            ErrorCategory::IndexError => "IndexError",
            ErrorCategory::KeyError => "KeyError",
            ErrorCategory::AttributeError => "AttributeError",
            ErrorCategory::ValueError => "ValueError",
            ErrorCategory::ModuleNotFoundError => "ModuleNotFoundError",
            ErrorCategory::FileNotFoundError => "FileNotFoundError",
            ErrorCategory::Other(label) => label.as_str(),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for ErrorCategory {
    fn from(label: String) -> Self {
        ErrorCategory::from_label(&label)
    }
}

impl From<ErrorCategory> for String {
    fn from(category: ErrorCategory) -> Self {
        category.label().to_string()
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to read model artifact {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse model artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid model artifact {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Turns raw diagnostic text into the feature space the predictor was trained on.
pub trait FeatureTransform: Send + Sync {
    fn transform(&self, text: &str) -> SparseVector;
    fn n_features(&self) -> usize;
}

/// Closed-set predictor: always returns one of its trained labels.
pub trait Predictor: Send + Sync {
    fn predict(&self, features: &SparseVector) -> Prediction;
    fn n_features(&self) -> usize;
    fn classes(&self) -> &[String];
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// Winning decision value. A low score is an accuracy concern, not an error.
    pub score: f64,
}

/// Pre-trained transform + predictor pair, immutable once loaded.
pub struct ErrorClassifier {
    transform: Box<dyn FeatureTransform>,
    predictor: Box<dyn Predictor>,
}

impl ErrorClassifier {
    pub fn new(
        transform: Box<dyn FeatureTransform>,
        predictor: Box<dyn Predictor>,
    ) -> Result<Self, String> {
        if transform.n_features() != predictor.n_features() {
            return Err(format!(
                "transform produces {} features but predictor expects {}",
                transform.n_features(),
                predictor.n_features()
            ));
        }
        Ok(Self {
            transform,
            predictor,
        })
    }

    /// The default model compiled into the binary.
    pub fn bundled() -> Result<Self, ArtifactError> {
        Self::from_json(BUNDLED_VECTORIZER, BUNDLED_CLASSIFIER).map_err(|reason| {
            ArtifactError::Invalid {
                path: PathBuf::from("<bundled>"),
                reason,
            }
        })
    }

    pub fn from_json(vectorizer_json: &str, classifier_json: &str) -> Result<Self, String> {
        let vectorizer = TfidfVectorizer::from_json(vectorizer_json)?;
        let model = LinearModel::from_json(classifier_json)?;
        Self::new(Box::new(vectorizer), Box::new(model))
    }

    /// Load the JSON vectorizer and classifier artifacts.
    pub fn load(vectorizer_path: &Path, classifier_path: &Path) -> Result<Self, ArtifactError> {
        let vectorizer = TfidfVectorizer::from_file(vectorizer_path)?;
        let model = LinearModel::from_file(classifier_path)?;
        log::debug!(
            "loaded classifier: {} features, {} classes",
            vectorizer.n_features(),
            model.classes().len()
        );
        Self::new(Box::new(vectorizer), Box::new(model)).map_err(|reason| {
            ArtifactError::Invalid {
                path: classifier_path.to_path_buf(),
                reason,
            }
        })
    }

    pub fn predict(&self, diagnostic_text: &str) -> Prediction {
        let features = self.transform.transform(diagnostic_text);
        let prediction = self.predictor.predict(&features);
        log::debug!(
            "predicted {} (score {:.3}, {} active features)",
            prediction.label,
            prediction.score,
            features.len()
        );
        prediction
    }

    pub fn classify(&self, diagnostic_text: &str) -> ErrorCategory {
        ErrorCategory::from_label(&self.predict(diagnostic_text).label)
    }

    pub fn classes(&self) -> &[String] {
        self.predictor.classes()
    }
}

pub(crate) fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ArtifactError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&contents).map_err(|e| ArtifactError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn bundled(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("models").join(name)
    }

    fn bundled_classifier() -> ErrorClassifier {
        ErrorClassifier::load(
            &bundled("error_vectorizer.json"),
            &bundled("error_classifier.json"),
        )
        .unwrap()
    }

    #[test]
    fn test_label_roundtrip_for_known_categories() {
        for category in ErrorCategory::KNOWN.iter() {
            assert_eq!(&ErrorCategory::from_label(category.label()), category);
        }
    }

    #[test]
    fn test_unknown_label_kept_verbatim() {
        let category = ErrorCategory::from_label("RecursionError");
        assert!(matches!(&category, ErrorCategory::Other(label) if label.as_str() == "RecursionError"));
        assert_eq!(category.to_string(), "RecursionError");
        assert_eq!(ErrorCategory::other().label(), "other");
    }

    #[test]
    fn test_category_serializes_as_label() {
        let json = serde_json::to_string(&ErrorCategory::KeyError).unwrap();
        assert_eq!(json, "\"KeyError\"");
        let parsed: ErrorCategory = serde_json::from_str("\"other\"").unwrap();
        assert_eq!(parsed, ErrorCategory::other());
    }

    #[test]
    fn test_bundled_artifact_classifies_common_tracebacks() {
        let classifier = bundled_classifier();
        let cases = [
            (
                "Traceback (most recent call last):\n  File \"/tmp/main.py\", line 1, in <module>\n    print(undefined_var)\n          ^^^^^^^^^^^^^\nNameError: name 'undefined_var' is not defined",
                ErrorCategory::NameError,
            ),
            (
                "Traceback (most recent call last):\n  File \"/tmp/main.py\", line 1, in <module>\n    1/0\n    ~^~\nZeroDivisionError: division by zero",
                ErrorCategory::ZeroDivisionError,
            ),
            (
                "  File \"/tmp/main.py\", line 1\n    print(\"hi)\n          ^\nSyntaxError: unterminated string literal (detected at line 1)",
                ErrorCategory::SyntaxError,
            ),
            (
                "  File \"/tmp/main.py\", line 2\n    print(i)\n    ^\nIndentationError: expected an indented block after 'for' statement on line 1",
                ErrorCategory::IndentationError,
            ),
            (
                "Traceback (most recent call last):\n  File \"/tmp/main.py\", line 1, in <module>\n    import numpyy\nModuleNotFoundError: No module named 'numpyy'",
                ErrorCategory::ModuleNotFoundError,
            ),
            (
                "Traceback (most recent call last):\n  File \"/tmp/main.py\", line 1, in <module>\n    \"a\" + 1\nTypeError: can only concatenate str (not \"int\") to str",
                ErrorCategory::TypeError,
            ),
            (
                "Traceback (most recent call last):\n  File \"/tmp/main.py\", line 1, in <module>\n    {}['k']\nKeyError: 'k'",
                ErrorCategory::KeyError,
            ),
        ];
        for (text, expected) in cases {
            assert_eq!(classifier.classify(text), expected, "text: {}", text);
        }
    }

    #[test]
    fn test_bundled_model_matches_files_on_disk() {
        let embedded = ErrorClassifier::bundled().unwrap();
        let on_disk = bundled_classifier();
        assert_eq!(embedded.classes(), on_disk.classes());
        let text = "Traceback (most recent call last):\nAttributeError: 'list' object has no attribute 'push'";
        assert_eq!(embedded.predict(text), on_disk.predict(text));
        assert_eq!(embedded.classify(text), ErrorCategory::AttributeError);
    }

    #[test]
    fn test_from_label_never_wraps_known_names() {
        for category in ErrorCategory::KNOWN.iter() {
            assert!(!matches!(
                ErrorCategory::from_label(category.label()),
                ErrorCategory::Other(_)
            ));
        }
    }

    #[test]
    fn test_unfamiliar_text_still_gets_a_trained_label() {
        let classifier = bundled_classifier();
        let prediction = classifier.predict("something odd happened");
        assert!(classifier.classes().contains(&prediction.label));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = bundled_classifier();
        let text = "IndexError: list index out of range";
        assert_eq!(classifier.predict(text), classifier.predict(text));
    }

    #[test]
    fn test_load_missing_artifact_fails() {
        let result = ErrorClassifier::load(
            Path::new("/nonexistent/vectorizer.json"),
            &bundled("error_classifier.json"),
        );
        assert!(matches!(result, Err(ArtifactError::Read { .. })));
    }

    #[test]
    fn test_load_corrupt_artifact_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x80\x04 this is a pickle, not json").unwrap();
        let result = ErrorClassifier::load(file.path(), &bundled("error_classifier.json"));
        assert!(matches!(
            result,
            Err(ArtifactError::Read { .. }) | Err(ArtifactError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_rejects_mismatched_dimensions() {
        let mut vectorizer = tempfile::NamedTempFile::new().unwrap();
        write!(
            vectorizer,
            r#"{{"vocabulary": {{"nameerror": 0}}, "idf": [1.0]}}"#
        )
        .unwrap();
        let result = ErrorClassifier::load(vectorizer.path(), &bundled("error_classifier.json"));
        assert!(matches!(result, Err(ArtifactError::Invalid { .. })));
    }
}
