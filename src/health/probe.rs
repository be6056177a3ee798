//! `/healthz` probe handler.

use axum::{extract::State, http::StatusCode, routing::get, Router};

use crate::health::state::HealthProbe;

pub const HEALTH_PATH: &str = "/healthz";

/// 204 when ready, 503 otherwise. Never has a body.
pub async fn probe(State(health): State<HealthProbe>) -> StatusCode {
    if health.is_ready() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Router serving only the probe. Methods other than GET get 405.
pub fn probe_router(health: HealthProbe) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(probe))
        .with_state(health)
}
