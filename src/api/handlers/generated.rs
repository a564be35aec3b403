// src/api/handlers/generated.rs
use actix_web::{web, HttpResponse};

use crate::api::AppState;
use crate::errors::GenError;
use crate::generator;
use crate::models::{GenerateTextRequest, RunRequest};

/// Returns the generated pytest module as `text/plain`.
pub async fn generate_text(
    state: web::Data<AppState>,
    req: web::Json<GenerateTextRequest>,
) -> Result<HttpResponse, GenError> {
    let tests_py = state
        .generator()
        .generate_text(&req)
        .await
        .inspect_err(|e| log::error!("❌ generate.txt failed ({}): {}", e.kind(), e))?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(tests_py))
}

/// Runs the newest generated module, or the one named in the body.
pub async fn run_tests(
    state: web::Data<AppState>,
    req: Option<web::Json<RunRequest>>,
) -> Result<HttpResponse, GenError> {
    let req = req.map(web::Json::into_inner).unwrap_or_default();
    let outcome = generator::run_existing(&state.config, &req)
        .await
        .inspect_err(|e| log::error!("❌ run failed ({}): {}", e.kind(), e))?;
    Ok(HttpResponse::Ok().json(outcome))
}
