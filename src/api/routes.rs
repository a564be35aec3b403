// src/api/routes.rs
use actix_web::web;
use super::handlers;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health_check))
        .service(
            web::scope("/bundle")
                .route("/generate-and-save", web::post().to(handlers::generate_and_save))
                .route("/generate-run", web::post().to(handlers::generate_and_run))
        )
        .service(
            web::scope("/tests")
                .route("/generate.txt", web::post().to(handlers::generate_text))
                .route("/run", web::post().to(handlers::run_tests))
        );
}
