use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{healthz, lookup_subscription, readyz, verify_session};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/v1/billing/verify", post(verify_session))
        .route("/v1/billing/subscriptions/:session_id", get(lookup_subscription))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
