use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App, HttpServer};
use log::{error, info, warn};

use cardio_api::config::ServerConfig;
use cardio_api::inference::ModelInference;
use cardio_api::routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();

    let config = ServerConfig::from_env().map_err(|e| {
        error!("invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    info!("🚀 Starting cardio prediction API");
    if !config.model_path.exists() {
        // Not fatal: the artifact is read per request and may appear later.
        warn!("model artifact {} does not exist yet", config.model_path.display());
    }
    if config.model_cache {
        warn!("predictor cache enabled: artifact changes need POST /clear-cache");
    }

    let model_data = web::Data::new(
        ModelInference::new(&config.model_path).with_cache(config.model_cache),
    );
    let bind_address = config.bind_address();

    info!("🌐 Listening on http://{}", bind_address);
    info!("👷 Workers: {}", config.workers);
    info!("📦 Model artifact: {}", model_data.model_path().display());
    info!("🔧 Endpoints:");
    info!("   POST /predict      - classify one patient record");
    info!("   GET  /health       - liveness");
    info!("   GET  /model-info   - artifact description");
    info!("   POST /clear-cache  - drop cached predictors");

    let cors_config = config.cors.clone();
    let json_limit = config.json_limit;

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(DefaultHeaders::new().add(("X-Content-Type-Options", "nosniff")))
            .wrap(cors_config.build())
            .app_data(model_data.clone())
            .app_data(routes::json_config(json_limit))
            .configure(routes::configure)
            .default_service(web::route().to(routes::not_found))
    })
    .workers(config.workers)
    .bind(&bind_address)?
    .run()
    .await
}
