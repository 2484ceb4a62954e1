use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use crophealth_backend::auth::{AuthMiddleware, JwtService};
use crophealth_backend::config::{AppConfig, JobStoreKind};
use crophealth_backend::jobs::{DynamoDbJobStore, InMemoryJobStore, JobStore};
use crophealth_backend::model::shared_artifacts;
use crophealth_backend::pipeline::{AnalysisOrchestrator, AnalysisService};
use crophealth_backend::providers::{
    HttpTileProvider, HttpTimeSeriesProvider, TileProvider, TimeSeriesProvider, Unconfigured,
};
use crophealth_backend::routes::configure_routes;

fn startup_error(e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::other(e.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        startup_error(e)
    })?;

    let artifacts = shared_artifacts();
    let classifier = artifacts.classifier();
    if classifier.is_degraded() {
        log::warn!("Predictions come from an untrained model");
    }
    if !artifacts.has_scaler() {
        log::warn!("No fitted scaler available; features are passed through unscaled");
    }

    let store: Arc<dyn JobStore> = match &config.job_store {
        JobStoreKind::Memory => {
            log::info!("Using in-memory job store");
            Arc::new(InMemoryJobStore::new())
        }
        JobStoreKind::DynamoDb { table } => Arc::new(DynamoDbJobStore::from_env(table.clone()).await),
    };

    let http = reqwest::Client::new();
    let compositor = config.pipeline.compositor().map_err(startup_error)?;
    let time_series: Arc<dyn TimeSeriesProvider> = match &config.observation_api_url {
        Some(url) => Arc::new(HttpTimeSeriesProvider::new(http.clone(), url.clone(), compositor)),
        None => {
            log::warn!("OBSERVATION_API_URL is not set; every analysis will fail");
            Arc::new(Unconfigured("OBSERVATION_API_URL"))
        }
    };
    let tiles: Arc<dyn TileProvider> = match &config.tile_api_url {
        Some(url) => Arc::new(HttpTileProvider::new(http.clone(), url.clone())),
        None => {
            log::warn!("TILE_API_URL is not set; results will have no map tile");
            Arc::new(Unconfigured("TILE_API_URL"))
        }
    };

    let orchestrator = AnalysisOrchestrator::new(
        store.clone(),
        time_series,
        tiles,
        classifier,
        artifacts.feature_builder(config.pipeline.min_time_steps),
    );
    let service = web::Data::new(AnalysisService::new(store, Arc::new(orchestrator)));
    let auth_middleware = AuthMiddleware::new(JwtService::new(&config.jwt_secret));

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);
    let cors_origins = config.cors_origins.clone();

    HttpServer::new(move || {
        let cors = cors_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::ACCEPT,
                actix_web::http::header::CONTENT_TYPE,
            ])
            .supports_credentials()
            .max_age(3600);
        App::new()
            .wrap(cors)
            .app_data(service.clone())
            .configure(|cfg| configure_routes(cfg, auth_middleware.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
