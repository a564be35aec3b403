// src/api/handlers/health.rs
use actix_web::{web, HttpResponse, Result};
use serde_json::json;

use crate::api::AppState;

pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "model": state.config.model,
        "fallback": state.config.fallback_model,
        "stub": state.config.stub_mode,
        "version": env!("CARGO_PKG_VERSION")
    })))
}
