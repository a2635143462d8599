use crate::models::CardioFeatures;

/// Column names, in the order the trained classifier was fitted on.
pub const FEATURE_COLUMNS: [&str; 10] = [
    "age",
    "gender",
    "ap_hi",
    "ap_lo",
    "cholesterol",
    "gluc",
    "smoke",
    "alco",
    "active",
    "bmi",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
}

impl FeatureValue {
    pub fn as_f32(self) -> f32 {
        match self {
            FeatureValue::Int(v) => v as f32,
            FeatureValue::Float(v) => v as f32,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            FeatureValue::Int(v) => v as f64,
            FeatureValue::Float(v) => v,
        }
    }

    /// Integer view; floats truncate toward zero.
    pub fn as_i64(self) -> i64 {
        match self {
            FeatureValue::Int(v) => v,
            FeatureValue::Float(v) => v.trunc() as i64,
        }
    }
}

/// Single-row tabular record handed to the predictor.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    values: [FeatureValue; 10],
}

impl FeatureFrame {
    pub fn from_features(features: &CardioFeatures) -> Self {
        Self {
            values: [
                FeatureValue::Int(features.age),
                FeatureValue::Int(features.gender),
                FeatureValue::Int(features.ap_hi),
                FeatureValue::Int(features.ap_lo),
                FeatureValue::Int(features.cholesterol),
                FeatureValue::Int(features.gluc),
                FeatureValue::Int(features.smoke),
                FeatureValue::Int(features.alco),
                FeatureValue::Int(features.active),
                FeatureValue::Float(features.bmi),
            ],
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        &FEATURE_COLUMNS
    }

    pub fn width(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, column: &str) -> Option<FeatureValue> {
        FEATURE_COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|idx| self.values[idx])
    }

    pub fn to_f32_row(&self) -> [f32; 10] {
        self.values.map(FeatureValue::as_f32)
    }

    pub fn to_f64_row(&self) -> [f64; 10] {
        self.values.map(FeatureValue::as_f64)
    }

    /// Ok when `declared` names the same columns in the same order.
    pub fn check_schema(&self, declared: &[String]) -> Result<(), String> {
        if declared.len() != self.width() {
            return Err(format!(
                "artifact expects {} features, request provides {}",
                declared.len(),
                self.width()
            ));
        }
        for (idx, (expected, got)) in self.columns().iter().zip(declared).enumerate() {
            if expected != got {
                return Err(format!(
                    "column {} is '{}' in the artifact but '{}' in the request",
                    idx, got, expected
                ));
            }
        }
        Ok(())
    }
}
