use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use gatepass_core::health::{Heartbeat, healthz, readyz};

pub fn build_router(heartbeat: Heartbeat) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(heartbeat)
}
