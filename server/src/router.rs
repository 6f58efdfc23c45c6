//! Shared application router builder.
//!
//! [`build_app_router`] is used by both `main.rs` and the integration tests
//! so they exercise the same middleware stack.

use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::handlers::{batch, health, jobs};
use crate::state::AppState;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Files accepted in one batch upload request.
const MAX_BATCH_FILES: usize = 50;

/// Build the full application [`Router`].
///
/// `/api` routes and `/health` are matched first; every other path is
/// served from the static directory.
pub fn build_app_router(state: AppState, config: &ServerConfig) -> Router {
    let upload_limit = state
        .service
        .config()
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes(upload_limit))
        .fallback_service(ServeDir::new(&config.static_dir).append_index_html_on_directories(true))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(build_cors_layer())
        .with_state(state)
}

fn api_routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/upload",
            post(jobs::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/process", post(jobs::process))
        .route("/status/{id}", get(jobs::status))
        .route("/download/{id}", get(jobs::download_redirect))
        .route("/download/{id}/{filename}", get(jobs::download))
        .route("/preview/{id}", get(jobs::preview))
        .route("/resize", post(jobs::resize))
        .route(
            "/batch/upload",
            post(batch::upload).layer(DefaultBodyLimit::max(
                upload_limit.saturating_mul(MAX_BATCH_FILES),
            )),
        )
        .route("/batch-process", post(batch::process))
        .route("/batch/status/{batch_id}", get(batch::status))
        .route("/batch/download/{batch_id}", get(batch::download))
}

/// The frontend may be served from a dev server on another origin.
pub fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
}
