use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{web, HttpRequest, HttpResponse};
use log::{error, info, warn};
use serde_json::Value;
use std::time::Instant;

use crate::error::ServiceError;
use crate::inference::ModelInference;
use crate::models::{
    CacheCleared, CardioFeatures, ErrorResponse, FieldError, HealthStatus, PredictionOutput,
    ValidationErrors,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/predict", web::post().to(predict))
        .route("/health", web::get().to(health_check))
        .route("/model-info", web::get().to(model_info))
        .route("/clear-cache", web::post().to(clear_cache));
}

/// Body extractor settings: malformed JSON is a client error (422).
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(json_error_handler)
}

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    warn!("rejected request body: {}", err);
    let response = match &err {
        JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
            HttpResponse::PayloadTooLarge().json(ErrorResponse::new("Request body too large"))
        }
        _ => {
            let detail = FieldError::body("json_invalid", &err.to_string());
            let errors = ValidationErrors::single(detail);
            HttpResponse::UnprocessableEntity().json(ErrorResponse::validation(&errors))
        }
    };
    InternalError::from_response(err, response).into()
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthStatus::ok())
}

async fn predict(
    model: web::Data<ModelInference>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ServiceError> {
    let start_time = Instant::now();
    info!("prediction request received");

    let features = CardioFeatures::from_value(&body).map_err(|errors| {
        warn!("validation failed: {}", errors);
        ServiceError::from(errors)
    })?;

    let model = model.clone();
    let label = web::block(move || model.predict(&features))
        .await
        .map_err(|e| ServiceError::Blocking(e.to_string()))
        .and_then(|result| result)
        .map_err(|e| {
            error!("prediction failed: {}", e);
            e
        })?;

    info!(
        "prediction served: Output={} in {}ms",
        label,
        start_time.elapsed().as_millis()
    );
    Ok(HttpResponse::Ok().json(PredictionOutput { output: label }))
}

async fn model_info(model: web::Data<ModelInference>) -> Result<HttpResponse, ServiceError> {
    let model = model.clone();
    let info = web::block(move || model.model_info())
        .await
        .map_err(|e| ServiceError::Blocking(e.to_string()))
        .and_then(|result| result)
        .map_err(|e| {
            error!("model info unavailable: {}", e);
            e
        })?;
    Ok(HttpResponse::Ok().json(info))
}

async fn clear_cache(model: web::Data<ModelInference>) -> HttpResponse {
    let cleared = model.clear_cache();
    info!("predictor cache cleared: {} entries", cleared);
    HttpResponse::Ok().json(CacheCleared { cleared })
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse::new("Endpoint not found"))
}
