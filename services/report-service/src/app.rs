use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{
    healthz, readyz, report_status, reset_report, run_sweep, stream, submit_report, summary,
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/v1/reports", post(submit_report))
        .route("/v1/reports/:id", get(report_status))
        .route("/v1/reports/:id/reset", post(reset_report))
        .route("/v1/admin/sweep", post(run_sweep))
        .route("/v1/summary", get(summary))
        .route("/v1/stream", get(stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
