use super::{read_artifact, ArtifactError, FeatureTransform, SparseVector};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L1,
    L2,
}

/// On-disk form of the vectorizer, before the token pattern is compiled.
#[derive(Debug, Deserialize)]
struct TfidfArtifact {
    #[serde(default = "default_true")]
    lowercase: bool,
    #[serde(default = "default_token_pattern")]
    token_pattern: String,
    #[serde(default = "default_ngram_range")]
    ngram_range: (usize, usize),
    #[serde(default)]
    sublinear_tf: bool,
    #[serde(default = "default_norm")]
    norm: Option<Norm>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

fn default_true() -> bool {
    true
}

fn default_token_pattern() -> String {
    DEFAULT_TOKEN_PATTERN.to_string()
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_norm() -> Option<Norm> {
    Some(Norm::L2)
}

/// Word n-gram TF-IDF transform with the same weighting as scikit-learn's
/// `TfidfVectorizer.transform`: raw (or `1 + ln`) counts times idf, then
/// row normalization.
#[derive(Debug)]
pub struct TfidfVectorizer {
    lowercase: bool,
    token_pattern: Regex,
    ngram_range: (usize, usize),
    sublinear_tf: bool,
    norm: Option<Norm>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn from_file(path: &Path) -> Result<Self, ArtifactError> {
        let artifact: TfidfArtifact = read_artifact(path)?;
        Self::from_artifact(artifact).map_err(|reason| ArtifactError::Invalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let artifact: TfidfArtifact = serde_json::from_str(json).map_err(|e| e.to_string())?;
        Self::from_artifact(artifact)
    }

    fn from_artifact(artifact: TfidfArtifact) -> Result<Self, String> {
        let (min_n, max_n) = artifact.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(format!("invalid ngram_range ({}, {})", min_n, max_n));
        }
        if artifact.idf.len() != artifact.vocabulary.len() {
            return Err(format!(
                "idf has {} entries but vocabulary has {} terms",
                artifact.idf.len(),
                artifact.vocabulary.len()
            ));
        }
        if let Some((term, index)) = artifact
            .vocabulary
            .iter()
            .find(|(_, &index)| index >= artifact.idf.len())
        {
            return Err(format!("term '{}' has out-of-range index {}", term, index));
        }
        let token_pattern = Regex::new(&artifact.token_pattern)
            .map_err(|e| format!("invalid token_pattern: {}", e))?;

        Ok(Self {
            lowercase: artifact.lowercase,
            token_pattern,
            ngram_range: artifact.ngram_range,
            sublinear_tf: artifact.sublinear_tf,
            norm: artifact.norm,
            vocabulary: artifact.vocabulary,
            idf: artifact.idf,
        })
    }

    fn tokenize<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.token_pattern.find_iter(text).map(|m| m.as_str()).collect()
    }

    fn term_counts(&self, text: &str) -> HashMap<usize, f64> {
        let mut counts = HashMap::new();
        let tokens = self.tokenize(text);
        let (min_n, max_n) = self.ngram_range;
        for n in min_n..=max_n {
            if n > tokens.len() {
                break;
            }
            for window in tokens.windows(n) {
                let term = window.join(" ");
                if let Some(&index) = self.vocabulary.get(&term) {
                    *counts.entry(index).or_insert(0.0) += 1.0;
                }
            }
        }
        counts
    }
}

impl FeatureTransform for TfidfVectorizer {
    fn transform(&self, text: &str) -> SparseVector {
        let lowered;
        let text = if self.lowercase {
            lowered = text.to_lowercase();
            lowered.as_str()
        } else {
            text
        };

        let mut features: SparseVector = self
            .term_counts(text)
            .into_iter()
            .map(|(index, count)| {
                let tf = if self.sublinear_tf { 1.0 + count.ln() } else { count };
                (index, tf * self.idf[index])
            })
            .collect();
        features.sort_by_key(|&(index, _)| index);

        let norm = match self.norm {
            Some(Norm::L2) => features.iter().map(|(_, v)| v * v).sum::<f64>().sqrt(),
            Some(Norm::L1) => features.iter().map(|(_, v)| v.abs()).sum::<f64>(),
            None => 0.0,
        };
        if norm > 0.0 {
            for (_, value) in features.iter_mut() {
                *value /= norm;
            }
        }
        features
    }

    fn n_features(&self) -> usize {
        self.idf.len()
    }
}
