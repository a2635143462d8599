//! JSON interchange format for linear and tree-ensemble classifiers.
//!
//! ```json
//! { "format": "cardio-model", "kind": "logistic",
//!   "feature_names": ["age", ...], "coefficients": [...],
//!   "intercept": -1.2, "classes": [0, 1] }
//! ```

use serde::Deserialize;
use std::io::Read;

use crate::error::PredictError;
use crate::inference::{ArtifactFormat, Predictor};
use crate::types::FeatureFrame;

pub const FORMAT_TAG: &str = "cardio-model";

#[derive(Debug, Deserialize)]
struct Envelope {
    format: String,
    #[serde(flatten)]
    model: InterchangeModel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterchangeModel {
    Logistic(LogisticModel),
    TreeEnsemble(TreeEnsemble),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogisticModel {
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub classes: [i64; 2],
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    0.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeEnsemble {
    pub feature_names: Vec<String>,
    pub classes: Vec<i64>,
    pub trees: Vec<Vec<TreeNode>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

impl InterchangeModel {
    /// Decode from a reader; the caller owns the file handle.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, String> {
        let envelope: Envelope = serde_json::from_reader(reader).map_err(|e| e.to_string())?;
        if envelope.format != FORMAT_TAG {
            return Err(format!(
                "unsupported format tag '{}', expected '{}'",
                envelope.format, FORMAT_TAG
            ));
        }
        envelope.model.check_shape()?;
        Ok(envelope.model)
    }

    /// Structural checks that do not depend on any request.
    fn check_shape(&self) -> Result<(), String> {
        match self {
            InterchangeModel::Logistic(m) => {
                if m.coefficients.len() != m.feature_names.len() {
                    return Err(format!(
                        "{} coefficients for {} features",
                        m.coefficients.len(),
                        m.feature_names.len()
                    ));
                }
            }
            InterchangeModel::TreeEnsemble(m) => {
                if m.classes.is_empty() {
                    return Err("tree ensemble declares no classes".to_string());
                }
                if m.trees.iter().any(Vec::is_empty) {
                    return Err("tree ensemble contains an empty tree".to_string());
                }
            }
        }
        Ok(())
    }
}

impl LogisticModel {
    pub fn probability(&self, row: &[f64]) -> Result<f64, PredictError> {
        if row.len() != self.coefficients.len() {
            return Err(PredictError::SchemaMismatch(format!(
                "{} coefficients for a row of {}",
                self.coefficients.len(),
                row.len()
            )));
        }
        let score: f64 = self
            .coefficients
            .iter()
            .zip(row)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept;
        if !score.is_finite() {
            return Err(PredictError::NonFinite(score));
        }
        Ok(1.0 / (1.0 + (-score).exp()))
    }

    fn label(&self, row: &[f64]) -> Result<i64, PredictError> {
        let p = self.probability(row)?;
        Ok(if p >= self.threshold {
            self.classes[1]
        } else {
            self.classes[0]
        })
    }
}

impl TreeEnsemble {
    fn leaf<'a>(tree: &'a [TreeNode], row: &[f64]) -> Result<&'a [f64], PredictError> {
        let mut idx = 0;
        // A well-formed tree reaches a leaf in fewer hops than it has nodes.
        for _ in 0..tree.len() {
            match tree.get(idx) {
                Some(TreeNode::Leaf { value }) => return Ok(value),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = row.get(*feature).ok_or_else(|| {
                        PredictError::Malformed(format!("split on unknown feature {}", feature))
                    })?;
                    idx = if x <= threshold { *left } else { *right };
                }
                None => {
                    return Err(PredictError::Malformed(format!(
                        "node {} out of range",
                        idx
                    )))
                }
            }
        }
        Err(PredictError::Malformed("tree does not terminate".to_string()))
    }

    /// Summed leaf votes per class.
    pub fn votes(&self, row: &[f64]) -> Result<Vec<f64>, PredictError> {
        let mut totals = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            let value = Self::leaf(tree, row)?;
            if value.len() != totals.len() {
                return Err(PredictError::Malformed(format!(
                    "leaf has {} votes for {} classes",
                    value.len(),
                    totals.len()
                )));
            }
            for (total, v) in totals.iter_mut().zip(value) {
                *total += v;
            }
        }
        Ok(totals)
    }

    fn label(&self, row: &[f64]) -> Result<i64, PredictError> {
        let votes = self.votes(row)?;
        let mut best = 0;
        for (idx, v) in votes.iter().enumerate() {
            if !v.is_finite() {
                return Err(PredictError::NonFinite(*v));
            }
            if *v > votes[best] {
                best = idx;
            }
        }
        Ok(self.classes[best])
    }
}

impl Predictor for InterchangeModel {
    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::Json
    }

    fn kind(&self) -> &str {
        match self {
            InterchangeModel::Logistic(_) => "logistic",
            InterchangeModel::TreeEnsemble(_) => "tree_ensemble",
        }
    }

    fn feature_names(&self) -> Option<Vec<String>> {
        match self {
            InterchangeModel::Logistic(m) => Some(m.feature_names.clone()),
            InterchangeModel::TreeEnsemble(m) => Some(m.feature_names.clone()),
        }
    }

    fn predict(&self, frame: &FeatureFrame) -> Result<Vec<i64>, PredictError> {
        let row = frame.to_f64_row();
        let label = match self {
            InterchangeModel::Logistic(m) => m.label(&row)?,
            InterchangeModel::TreeEnsemble(m) => m.label(&row)?,
        };
        Ok(vec![label])
    }
}
