//! Cardiovascular risk prediction API.
//!
//! `POST /predict` validates ten patient measurements, reloads the trained
//! classifier from disk and answers `{"Output": <label>}`.

pub mod config;
pub mod error;
pub mod inference;
pub mod interchange;
pub mod models;
pub mod routes;
pub mod types;

pub use config::{ConfigError, CorsConfig, ServerConfig};
pub use error::{PredictError, ServiceError};
pub use inference::{ModelInference, Predictor};
pub use models::{CardioFeatures, PredictionOutput};
