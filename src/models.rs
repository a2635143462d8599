use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::types::FEATURE_COLUMNS;

/// Patient measurements accepted by `POST /predict`.
#[derive(Debug, Clone, PartialEq)]
pub struct CardioFeatures {
    pub age: i64,
    pub gender: i64,
    pub ap_hi: i64,
    pub ap_lo: i64,
    pub cholesterol: i64,
    pub gluc: i64,
    pub smoke: i64,
    pub alco: i64,
    pub active: i64,
    pub bmi: f64,
}

impl CardioFeatures {
    /// Validate an untyped JSON body field by field.
    ///
    /// Every failing field is reported, not just the first one. There are no
    /// range or cross-field checks: `ap_hi < ap_lo` is accepted as-is.
    pub fn from_value(body: &Value) -> Result<Self, ValidationErrors> {
        let object = match body {
            Value::Object(map) => map,
            _ => {
                return Err(ValidationErrors::single(FieldError::body(
                    "model_type",
                    "Input should be a valid dictionary or object",
                )))
            }
        };

        let mut errors = ValidationErrors::default();
        let mut ints = [0i64; 9];
        for (slot, name) in ints.iter_mut().zip(&FEATURE_COLUMNS[..9]) {
            match integer_field(object, name) {
                Ok(v) => *slot = v,
                Err(e) => errors.push(e),
            }
        }
        let bmi = match float_field(object, "bmi") {
            Ok(v) => v,
            Err(e) => {
                errors.push(e);
                0.0
            }
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        let [age, gender, ap_hi, ap_lo, cholesterol, gluc, smoke, alco, active] = ints;
        Ok(Self {
            age,
            gender,
            ap_hi,
            ap_lo,
            cholesterol,
            gluc,
            smoke,
            alco,
            active,
            bmi,
        })
    }
}

fn integer_field(object: &Map<String, Value>, name: &str) -> Result<i64, FieldError> {
    let value = object
        .get(name)
        .ok_or_else(|| FieldError::field(name, "missing", "Field required"))?;

    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                return Ok(v);
            }
            if n.is_u64() {
                return Err(FieldError::field(
                    name,
                    "int_parsing",
                    "Input should fit in a signed 64-bit integer",
                ));
            }
            match n.as_f64() {
                Some(f) if f.fract() != 0.0 => Err(FieldError::field(
                    name,
                    "int_from_float",
                    "Input should be a valid integer, got a number with a fractional part",
                )),
                Some(f) if f >= i64::MIN as f64 && f < i64::MAX as f64 => Ok(f as i64),
                _ => Err(FieldError::field(
                    name,
                    "int_parsing",
                    "Input should fit in a signed 64-bit integer",
                )),
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| {
            FieldError::field(
                name,
                "int_parsing",
                "Input should be a valid integer, unable to parse string as an integer",
            )
        }),
        Value::Bool(b) => Ok(i64::from(*b)),
        _ => Err(FieldError::field(
            name,
            "int_type",
            "Input should be a valid integer",
        )),
    }
}

fn float_field(object: &Map<String, Value>, name: &str) -> Result<f64, FieldError> {
    let value = object
        .get(name)
        .ok_or_else(|| FieldError::field(name, "missing", "Field required"))?;

    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => {
            return Err(FieldError::field(
                name,
                "float_type",
                "Input should be a valid number",
            ))
        }
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(FieldError::field(
            name,
            "float_parsing",
            "Input should be a valid number, unable to parse string as a number",
        )),
    }
}

/// One failing location in a request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    pub fn field(name: &str, kind: &str, msg: &str) -> Self {
        Self {
            loc: vec!["body".to_string(), name.to_string()],
            msg: msg.to_string(),
            kind: kind.to_string(),
        }
    }

    pub fn body(kind: &str, msg: &str) -> Self {
        Self {
            loc: vec!["body".to_string()],
            msg: msg.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Field name when the error points inside the body.
    pub fn field_name(&self) -> Option<&str> {
        self.loc.get(1).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn single(error: FieldError) -> Self {
        Self(vec![error])
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().filter_map(FieldError::field_name).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.loc.join("."), e.msg))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Success body of `POST /predict`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutput {
    #[serde(rename = "Output")]
    pub output: i64,
}

/// Error envelope shared by every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub detail: Vec<FieldError>,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        ErrorResponse {
            error: message.to_string(),
            detail: Vec::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn validation(errors: &ValidationErrors) -> Self {
        ErrorResponse {
            error: "Request validation failed".to_string(),
            detail: errors.errors().to_vec(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: String,
}

impl HealthStatus {
    pub fn ok() -> Self {
        HealthStatus {
            status: "ok",
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub path: String,
    pub format: &'static str,
    pub kind: String,
    pub feature_names: Option<Vec<String>>,
    pub expected_columns: Vec<&'static str>,
    pub cache_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct CacheCleared {
    pub cleared: usize,
}
