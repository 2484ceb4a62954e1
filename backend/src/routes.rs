use actix_web::{HttpResponse, web};
use log::info;
use serde_json::json;
use shared::{AnalysisRequest, AnalysisResponse, AnalysisResult, JobStatus};

use crate::auth::{AuthMiddleware, AuthenticatedUser};
use crate::error::ServiceError;
use crate::pipeline::AnalysisService;

/// Health endpoints are public; everything under `/api` needs a bearer token.
pub fn configure_routes(cfg: &mut web::ServiceConfig, auth_middleware: AuthMiddleware) {
    cfg.route("/", web::get().to(root))
        .route("/health", web::get().to(health))
        .service(
            web::scope("/api")
                .wrap(auth_middleware)
                .route("/analyze", web::post().to(analyze))
                .route("/result/{job_id}", web::get().to(get_result))
                .route("/jobs", web::get().to(list_jobs)),
        );
}

async fn root() -> HttpResponse {
    HttpResponse::Ok().json(json!({"message": "CropHealth AI API is running"}))
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({"status": "ok"}))
}

async fn analyze(
    service: web::Data<AnalysisService>,
    user: AuthenticatedUser,
    request: web::Json<AnalysisRequest>,
) -> Result<HttpResponse, ServiceError> {
    let job_id = service.submit_job(&user.0, request.into_inner()).await?;
    info!("Accepted analysis job {}", job_id);
    Ok(HttpResponse::Ok().json(AnalysisResponse {
        job_id,
        status: JobStatus::Pending,
        message: "Analysis job created. Poll /api/result/{job_id} for status.".to_string(),
    }))
}

async fn get_result(
    service: web::Data<AnalysisService>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let record = service.get_job(&path.into_inner(), &user.0).await?;
    Ok(HttpResponse::Ok().json(record.to_result()))
}

async fn list_jobs(
    service: web::Data<AnalysisService>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, ServiceError> {
    let results: Vec<AnalysisResult> = service
        .list_jobs(&user.0)
        .await?
        .iter()
        .map(|record| record.to_result())
        .collect();
    Ok(HttpResponse::Ok().json(results))
}
