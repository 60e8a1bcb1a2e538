use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{sse::Event, sse::KeepAlive, sse::Sse, IntoResponse},
    Json,
};
use std::{convert::Infallible, time::Duration};
use uuid::Uuid;

use crate::models::SubmitReportRequest;
use crate::service;
use crate::state::AppState;

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn readyz() -> StatusCode {
    StatusCode::OK
}

pub async fn submit_report(
    State(state): State<AppState>,
    Json(payload): Json<SubmitReportRequest>,
) -> impl IntoResponse {
    match service::submit_report(&state, payload).await {
        Ok((status, response)) => (status, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn report_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> impl IntoResponse {
    match service::report_status(&state, job_id).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn reset_report(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> impl IntoResponse {
    match service::reset_report(&state, job_id).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn run_sweep(State(state): State<AppState>) -> impl IntoResponse {
    match service::sweep_stale(&state).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn summary(State(state): State<AppState>) -> impl IntoResponse {
    match service::build_summary(&state).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let mut updates = state.updates.subscribe();
    let interval = state.stream_interval;

    let stream = async_stream::stream! {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {},
                _ = updates.recv() => {},
            }

            match service::build_summary(&state).await {
                Ok(summary) => {
                    if let Ok(event) = Event::default().json_data(summary) {
                        yield Ok(event);
                    }
                }
                Err(err) => {
                    let fallback = serde_json::json!({ "error": err.body.message });
                    if let Ok(event) = Event::default().json_data(fallback) {
                        yield Ok(event);
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
