//! Inference boundary for segment classification.
//!
//! The classifier only needs `predict(fixed-length vector) -> probabilities`.
//! Handles are shared as `Arc<dyn InferenceModel>` and never mutated after
//! loading, so one model serves every lead and every concurrent caller.

use crate::error::EcgError;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, sync::Arc};

pub trait InferenceModel: Send + Sync {
    /// Length of the vector `predict` expects.
    fn input_len(&self) -> usize;

    /// Class probabilities for one preprocessed segment.
    fn predict(&self, input: &[f64]) -> Result<Vec<f64>, EcgError>;
}

pub type SharedModel = Arc<dyn InferenceModel>;

/// Softmax regression persisted as JSON: `weights[class][sample]` plus `bias[class]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSoftmaxModel {
    pub input_len: usize,
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl LinearSoftmaxModel {
    pub fn new(weights: Vec<Vec<f64>>, bias: Vec<f64>) -> Result<Self, EcgError> {
        let input_len = weights.first().map(Vec::len).unwrap_or(0);
        let model = Self {
            input_len,
            weights,
            bias,
        };
        model.check_shape()?;
        Ok(model)
    }

    /// Model that ignores its input and always favours `class`.
    pub fn constant(input_len: usize, classes: usize, class: usize) -> Result<Self, EcgError> {
        let mut bias = vec![0.0; classes];
        match bias.get_mut(class) {
            Some(b) => *b = 1.0,
            None => {
                return Err(EcgError::invalid(format!(
                    "class {class} out of range for {classes} classes"
                )))
            }
        }
        Self::new(vec![vec![0.0; input_len]; classes], bias)
    }

    pub fn from_json_str(text: &str) -> Result<Self, EcgError> {
        let model: Self = serde_json::from_str(text)
            .map_err(|e| EcgError::ModelUnavailable(format!("malformed model artifact: {e}")))?;
        model.check_shape()?;
        Ok(model)
    }

    pub fn load(path: &Path) -> Result<Self, EcgError> {
        let text = fs::read_to_string(path).map_err(|e| {
            EcgError::ModelUnavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    fn check_shape(&self) -> Result<(), EcgError> {
        if self.input_len == 0 || self.bias.is_empty() {
            return Err(EcgError::ModelUnavailable(
                "model must have at least one class and one input".into(),
            ));
        }
        if self.weights.len() != self.bias.len()
            || self.weights.iter().any(|row| row.len() != self.input_len)
        {
            return Err(EcgError::ModelUnavailable(format!(
                "weights must be {} x {} to match bias and input length",
                self.bias.len(),
                self.input_len
            )));
        }
        Ok(())
    }
}

impl InferenceModel for LinearSoftmaxModel {
    fn input_len(&self) -> usize {
        self.input_len
    }

    fn predict(&self, input: &[f64]) -> Result<Vec<f64>, EcgError> {
        if input.len() != self.input_len {
            return Err(EcgError::invalid(format!(
                "model expects {} samples, got {}",
                self.input_len,
                input.len()
            )));
        }
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect();
        Ok(softmax(&logits))
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn probabilities_sum_to_one() {
        let model = LinearSoftmaxModel::new(
            vec![vec![1.0, -1.0], vec![0.5, 0.5], vec![-2.0, 0.0]],
            vec![0.0, 0.1, 0.2],
        )
        .unwrap();
        let p = model.predict(&[0.3, -0.7]).unwrap();
        assert_eq!(p.len(), 3);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn constant_model_favours_its_class() {
        let model = LinearSoftmaxModel::constant(8, 5, 3).unwrap();
        let p = model.predict(&[0.5; 8]).unwrap();
        let best = p
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i);
        assert_eq!(best, Some(3));
    }

    #[test]
    fn rejects_wrong_input_length() {
        let model = LinearSoftmaxModel::constant(8, 5, 0).unwrap();
        assert!(matches!(
            model.predict(&[0.0; 7]),
            Err(EcgError::InvalidParameter(_))
        ));
    }

    #[test]
    fn loads_json_artifact() {
        let model = LinearSoftmaxModel::constant(4, 5, 1).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&model).unwrap().as_bytes())
            .unwrap();
        let loaded = LinearSoftmaxModel::load(file.path()).unwrap();
        assert_eq!(loaded, model);
    }

    #[test]
    fn missing_or_malformed_artifact_is_unavailable() {
        assert!(matches!(
            LinearSoftmaxModel::load(Path::new("/nonexistent/model.json")),
            Err(EcgError::ModelUnavailable(_))
        ));
        assert!(matches!(
            LinearSoftmaxModel::from_json_str("{\"input_len\": 2}"),
            Err(EcgError::ModelUnavailable(_))
        ));
        assert!(matches!(
            LinearSoftmaxModel::from_json_str(
                "{\"input_len\": 2, \"weights\": [[1.0]], \"bias\": [0.0]}"
            ),
            Err(EcgError::ModelUnavailable(_))
        ));
    }
}
