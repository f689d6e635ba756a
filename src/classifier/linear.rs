use super::{read_artifact, ArtifactError, Prediction, Predictor, SparseVector};
use serde::Deserialize;
use std::path::Path;

/// Linear multi-class model (one-vs-rest decision function), the shape
/// exported by logistic regression and linear SVM trainers.
///
/// With two classes a single coefficient row is accepted: a positive
/// decision value selects the second class.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearModel {
    classes: Vec<String>,
    coef: Vec<Vec<f64>>,
    intercept: Vec<f64>,
}

impl LinearModel {
    pub fn from_file(path: &Path) -> Result<Self, ArtifactError> {
        let model: LinearModel = read_artifact(path)?;
        model.validate().map_err(|reason| ArtifactError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(model)
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let model: LinearModel = serde_json::from_str(json).map_err(|e| e.to_string())?;
        model.validate()?;
        Ok(model)
    }

    fn is_binary(&self) -> bool {
        self.classes.len() == 2 && self.coef.len() == 1
    }

    fn validate(&self) -> Result<(), String> {
        if self.classes.is_empty() {
            return Err("model has no classes".to_string());
        }
        let expected_rows = if self.is_binary() { 1 } else { self.classes.len() };
        if self.coef.len() != expected_rows {
            return Err(format!(
                "expected {} coefficient rows for {} classes, found {}",
                expected_rows,
                self.classes.len(),
                self.coef.len()
            ));
        }
        if self.intercept.len() != expected_rows {
            return Err(format!(
                "expected {} intercepts, found {}",
                expected_rows,
                self.intercept.len()
            ));
        }
        let width = self.coef[0].len();
        if self.coef.iter().any(|row| row.len() != width) {
            return Err("coefficient rows have different lengths".to_string());
        }
        Ok(())
    }

    fn decision(&self, row: usize, features: &SparseVector) -> f64 {
        let weights = &self.coef[row];
        features
            .iter()
            .filter_map(|&(index, value)| weights.get(index).map(|w| w * value))
            .sum::<f64>()
            + self.intercept[row]
    }
}

impl Predictor for LinearModel {
    fn predict(&self, features: &SparseVector) -> Prediction {
        if self.is_binary() {
            let score = self.decision(0, features);
            let label = if score > 0.0 { &self.classes[1] } else { &self.classes[0] };
            return Prediction {
                label: label.clone(),
                score,
            };
        }

        // Strict `>` keeps the earliest class on ties.
        let mut best = 0;
        let mut best_score = self.decision(0, features);
        for row in 1..self.classes.len() {
            let score = self.decision(row, features);
            if score > best_score {
                best = row;
                best_score = score;
            }
        }
        Prediction {
            label: self.classes[best].clone(),
            score: best_score,
        }
    }

    fn n_features(&self) -> usize {
        self.coef.first().map(|row| row.len()).unwrap_or(0)
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }
}
