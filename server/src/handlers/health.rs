use axum::extract::State;
use axum::Json;
use serde::Serialize;

use better_images::broadcast::JobCounts;
use better_images::PoolHealth;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    #[serde(flatten)]
    pool: PoolHealth,
    jobs: JobCounts,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        pool: state.service.health(),
        jobs: state.service.store().counts(),
    })
}
