// src/api/handlers/bundle.rs
use actix_web::{web, HttpResponse};

use crate::api::AppState;
use crate::errors::GenError;
use crate::models::BundleRequest;

pub async fn generate_and_save(
    state: web::Data<AppState>,
    req: web::Json<BundleRequest>,
) -> Result<HttpResponse, GenError> {
    let resp = state
        .generator()
        .generate_and_save(&req)
        .await
        .inspect_err(|e| log::error!("❌ generate-and-save failed ({}): {}", e.kind(), e))?;
    Ok(HttpResponse::Ok().json(resp))
}

pub async fn generate_and_run(
    state: web::Data<AppState>,
    req: web::Json<BundleRequest>,
) -> Result<HttpResponse, GenError> {
    let resp = state
        .generator()
        .generate_and_run(&req)
        .await
        .inspect_err(|e| log::error!("❌ generate-run failed ({}): {}", e.kind(), e))?;
    Ok(HttpResponse::Ok().json(resp))
}
