use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::models::{
    ErrorResponse, SubscriptionView, VerifySessionRequest, VerifySessionResponse,
};
use crate::service;
use crate::state::AppState;

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn readyz() -> StatusCode {
    StatusCode::OK
}

pub async fn verify_session(
    State(state): State<AppState>,
    Json(payload): Json<VerifySessionRequest>,
) -> impl IntoResponse {
    let Some(session_id) = payload.session_id.as_deref() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                code: "missing_session",
                message: "session_id is required",
            }),
        )
            .into_response();
    };

    match service::verify_session(state.provider.as_ref(), state.store.as_ref(), session_id).await
    {
        Ok(record) => (
            StatusCode::OK,
            Json(VerifySessionResponse {
                status: "ok",
                subscription: SubscriptionView::from_record(&record),
            }),
        )
            .into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn lookup_subscription(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.store.find_by_session(&session_id).await {
        Ok(Some(record)) => {
            (StatusCode::OK, Json(SubscriptionView::from_record(&record))).into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                code: "subscription_not_found",
                message: "no subscription for this session",
            }),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(session_id = session_id.as_str(), error = %err, "lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    code: "db_error",
                    message: "database error",
                }),
            )
                .into_response()
        }
    }
}
