use axum::http::StatusCode;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use uuid::Uuid;

use crate::db::{self, ReportJobRow};
use crate::gate::free_reveal_count;
use crate::generator::{PollOutcome, StartOutcome};
use crate::lifecycle::{transition, JobState, ReportStatus, StateUpdate};
use crate::models::{
    ErrorResponse, LiveSummary, ReportStatusResponse, ResetReportResponse, StatusCounts,
    SubmitReportRequest, SubmitReportResponse, SweepResponse,
};
use crate::staleness::{is_processing_stale, ReportType, StaleCheck};
use crate::state::AppState;

/// Error code written on jobs the staleness sweep auto-fails.
pub const STALE_ERROR: &str = "stale_processing_timeout";

pub struct ServiceError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ServiceError {
    pub fn new(status: StatusCode, code: &'static str, message: String) -> Self {
        Self {
            status,
            body: ErrorResponse { code, message },
        }
    }
}

fn db_error(err: String) -> ServiceError {
    ServiceError::new(StatusCode::INTERNAL_SERVER_ERROR, "db_error", err)
}

pub fn notify_update(state: &AppState) {
    let _ = state.updates.send(());
}

/// Stable digest of the logical request, used to fold duplicate submissions
/// onto the running job. serde_json renders object keys sorted, so equal
/// payloads hash equally regardless of how the client ordered them.
pub fn request_fingerprint(report_type: &str, birth_details: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(report_type.as_bytes());
    hasher.update(b"\n");
    hasher.update(birth_details.to_string().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

pub async fn submit_report(
    state: &AppState,
    payload: SubmitReportRequest,
) -> Result<(StatusCode, SubmitReportResponse), ServiceError> {
    let Some(report_type_raw) = payload.report_type else {
        return Err(ServiceError::new(
            StatusCode::BAD_REQUEST,
            "missing_report_type",
            "report_type is required".to_string(),
        ));
    };
    let report_type = ReportType::from_str(&report_type_raw).map_err(|_| {
        ServiceError::new(
            StatusCode::BAD_REQUEST,
            "unknown_report_type",
            format!("unsupported report type: {report_type_raw}"),
        )
    })?;

    let Some(birth_details) = payload.birth_details else {
        return Err(ServiceError::new(
            StatusCode::BAD_REQUEST,
            "missing_birth_details",
            "birth_details is required".to_string(),
        ));
    };

    let tier = payload.tier.unwrap_or_else(|| "free".to_string());
    if tier != "free" && tier != "paid" {
        return Err(ServiceError::new(
            StatusCode::BAD_REQUEST,
            "unknown_tier",
            format!("unsupported tier: {tier}"),
        ));
    }

    let fingerprint = request_fingerprint(report_type.as_str(), &birth_details);

    let existing = {
        let db = state.db.lock().await;
        db::select_active_by_fingerprint(&db, &fingerprint)
            .await
            .map_err(db_error)?
    };
    if let Some(job) = existing {
        tracing::info!(job_id = %job.id, "submission matched an active job");
        return Ok((
            StatusCode::OK,
            SubmitReportResponse {
                status: "ok",
                job_id: job.id.to_string(),
                job_status: job.status,
                deduplicated: true,
            },
        ));
    }

    // New jobs enter the lifecycle at verifying; idle never hits storage.
    let initial = transition(
        &JobState::initial(),
        ReportStatus::Verifying,
        StateUpdate::default(),
    );
    let job = {
        let db = state.db.lock().await;
        db::insert_job(
            &*db,
            Uuid::new_v4(),
            &fingerprint,
            report_type.as_str(),
            &tier,
            initial.status.as_str(),
            &birth_details,
        )
        .await
        .map_err(db_error)?
    };

    tracing::info!(
        job_id = %job.id,
        report_type = report_type.as_str(),
        tier = tier.as_str(),
        "report job accepted"
    );

    tokio::spawn(run_generation(state.clone(), job.id));
    notify_update(state);

    Ok((
        StatusCode::ACCEPTED,
        SubmitReportResponse {
            status: "ok",
            job_id: job.id.to_string(),
            job_status: job.status,
            deduplicated: false,
        },
    ))
}

pub async fn report_status(
    state: &AppState,
    job_id: Uuid,
) -> Result<ReportStatusResponse, ServiceError> {
    let job = load_job(state, job_id).await?;
    let (sections_total, sections_revealed, sections) =
        shape_sections(&job.tier, job.sections.as_ref());

    Ok(ReportStatusResponse {
        status: "ok",
        job_id: job.id.to_string(),
        job_status: job.status,
        report_type: job.report_type,
        tier: job.tier,
        report_id: job.report_id.map(|id| id.to_string()),
        error: job.error,
        sections_total,
        sections_revealed,
        sections,
        created_at: job.created_at.to_rfc3339(),
        updated_at: job.updated_at.to_rfc3339(),
    })
}

pub async fn reset_report(
    state: &AppState,
    job_id: Uuid,
) -> Result<ResetReportResponse, ServiceError> {
    let job = load_job(state, job_id).await?;
    let current = job_state(&job);
    let next = transition(&current, ReportStatus::Idle, StateUpdate::default());

    if next.status == ReportStatus::Idle {
        let db = state.db.lock().await;
        let applied = db::apply_transition(&db, job.id, current.status.as_str(), &next, None)
            .await
            .map_err(db_error)?;
        if !applied {
            tracing::warn!(job_id = %job.id, "reset lost a concurrent update");
        }
        notify_update(state);
    }

    // The machine's answer is the contract: an illegal reset echoes the
    // unchanged status with a 200, and the caller reads the state.
    Ok(ResetReportResponse {
        status: "ok",
        job_id: job.id.to_string(),
        job_status: next.status.to_string(),
    })
}

/// Auto-fails processing jobs whose last update is past the staleness window.
///
/// The transition goes through the lifecycle machine and the guarded update,
/// so a job that completed while the sweep was looking at it stays completed.
pub async fn sweep_stale(state: &AppState) -> Result<SweepResponse, ServiceError> {
    let jobs = {
        let db = state.db.lock().await;
        db::list_processing(&db).await.map_err(db_error)?
    };

    let scanned = jobs.len();
    let mut flagged = 0;

    for job in jobs {
        let updated_at = job.updated_at.to_rfc3339();
        let check = StaleCheck {
            updated_at: Some(&updated_at),
            report_type: Some(&job.report_type),
        };
        if !is_processing_stale(&check) {
            continue;
        }

        let current = job_state(&job);
        if !current.status.is_processing() {
            continue;
        }
        let failed = transition(
            &current,
            ReportStatus::Failed,
            StateUpdate {
                error: Some(STALE_ERROR.to_string()),
                ..Default::default()
            },
        );
        if failed.status != ReportStatus::Failed {
            continue;
        }

        let db = state.db.lock().await;
        let applied = db::apply_transition(&db, job.id, current.status.as_str(), &failed, None)
            .await
            .map_err(db_error)?;
        if applied {
            flagged += 1;
            tracing::info!(
                job_id = %job.id,
                report_type = job.report_type.as_str(),
                "stale job auto-failed"
            );
        }
    }

    if flagged > 0 {
        notify_update(state);
    }

    Ok(SweepResponse {
        status: "ok",
        scanned,
        flagged,
    })
}

pub async fn build_summary(state: &AppState) -> Result<LiveSummary, ServiceError> {
    let counts = {
        let db = state.db.lock().await;
        db::status_counts(&db).await.map_err(db_error)?
    };

    let mut jobs = StatusCounts::default();
    for (status, count) in counts {
        let count = count.max(0) as u64;
        match ReportStatus::from_str(&status) {
            Ok(ReportStatus::Idle) => jobs.idle += count,
            Ok(ReportStatus::Verifying) => jobs.verifying += count,
            Ok(ReportStatus::Generating) => jobs.generating += count,
            Ok(ReportStatus::Polling) => jobs.polling += count,
            Ok(ReportStatus::Completed) => jobs.completed += count,
            Ok(ReportStatus::Failed) => jobs.failed += count,
            Ok(ReportStatus::Timeout) => jobs.timeout += count,
            Err(_) => {}
        }
    }

    Ok(LiveSummary {
        updated_at: Utc::now().to_rfc3339(),
        jobs,
    })
}

async fn load_job(state: &AppState, job_id: Uuid) -> Result<ReportJobRow, ServiceError> {
    let db = state.db.lock().await;
    db::select_job(&db, job_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| {
            ServiceError::new(
                StatusCode::NOT_FOUND,
                "job_not_found",
                "report job not found".to_string(),
            )
        })
}

fn job_state(job: &ReportJobRow) -> JobState {
    let status = match ReportStatus::from_str(&job.status) {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!(
                job_id = %job.id,
                status = job.status.as_str(),
                "unknown status in storage, treating as idle"
            );
            ReportStatus::Idle
        }
    };

    JobState {
        status,
        report_id: job.report_id,
        error: job.error.clone(),
        started_at: job.started_at,
    }
}

/// Free reports are cut at the gate on every read; paid reports pass through.
fn shape_sections(
    tier: &str,
    sections: Option<&serde_json::Value>,
) -> (Option<usize>, Option<usize>, Option<Vec<serde_json::Value>>) {
    let Some(list) = sections.and_then(|value| value.as_array()) else {
        return (None, None, None);
    };

    let total = list.len();
    let revealed = if tier == "paid" {
        total
    } else {
        free_reveal_count(total as f64)
    };

    (
        Some(total),
        Some(revealed),
        Some(list.iter().take(revealed).cloned().collect()),
    )
}

async fn run_generation(state: AppState, job_id: Uuid) {
    if let Err(err) = drive_generation(&state, job_id).await {
        tracing::error!(job_id = %job_id, error = %err, "generation task failed");
    }
    notify_update(&state);
}

async fn drive_generation(state: &AppState, job_id: Uuid) -> Result<(), String> {
    let job = {
        let db = state.db.lock().await;
        db::select_job(&db, job_id).await?
    };
    let Some(job) = job else {
        return Err("job disappeared before generation".to_string());
    };
    let current = job_state(&job);

    // Fast path: an identical request already finished, so re-verification
    // completes immediately without touching the upstream.
    let twin = {
        let db = state.db.lock().await;
        db::select_completed_by_fingerprint(&db, &job.fingerprint).await?
    };
    if let Some(twin) = twin.filter(|twin| twin.id != job.id) {
        let next = transition(
            &current,
            ReportStatus::Completed,
            StateUpdate {
                report_id: twin.report_id,
                ..Default::default()
            },
        );
        persist(state, job.id, &current, &next, twin.sections.as_ref()).await?;
        tracing::info!(job_id = %job.id, source_job = %twin.id, "reused completed report");
        return Ok(());
    }

    let generating = transition(
        &current,
        ReportStatus::Generating,
        StateUpdate {
            report_id: Some(Uuid::new_v4()),
            started_at: Some(Utc::now()),
            error: None,
        },
    );
    if !persist(state, job.id, &current, &generating, None).await? {
        return Ok(());
    }
    notify_update(state);

    let report_type = ReportType::from_str(&job.report_type)
        .map_err(|_| format!("job carries unknown report type: {}", job.report_type))?;

    match state.generator.start(report_type, &job.birth_details).await {
        Ok(StartOutcome::Completed(sections)) => {
            let done = transition(&generating, ReportStatus::Completed, StateUpdate::default());
            let sections = serde_json::Value::Array(sections);
            persist(state, job.id, &generating, &done, Some(&sections)).await?;
        }
        Ok(StartOutcome::Accepted { upstream_id }) => {
            let polling = transition(&generating, ReportStatus::Polling, StateUpdate::default());
            if !persist(state, job.id, &generating, &polling, None).await? {
                return Ok(());
            }
            notify_update(state);
            poll_until_done(state, job.id, &polling, &upstream_id).await?;
        }
        Err(err) => {
            let failed = transition(
                &generating,
                ReportStatus::Failed,
                StateUpdate {
                    error: Some(err),
                    ..Default::default()
                },
            );
            persist(state, job.id, &generating, &failed, None).await?;
        }
    }

    Ok(())
}

async fn poll_until_done(
    state: &AppState,
    job_id: Uuid,
    current: &JobState,
    upstream_id: &str,
) -> Result<(), String> {
    for _ in 0..state.poll_max_attempts {
        tokio::time::sleep(state.poll_interval).await;

        match state.generator.poll(upstream_id).await {
            Ok(PollOutcome::Pending) => continue,
            Ok(PollOutcome::Ready(sections)) => {
                let done = transition(current, ReportStatus::Completed, StateUpdate::default());
                let sections = serde_json::Value::Array(sections);
                persist(state, job_id, current, &done, Some(&sections)).await?;
                return Ok(());
            }
            Ok(PollOutcome::Failed(reason)) => {
                let failed = transition(
                    current,
                    ReportStatus::Failed,
                    StateUpdate {
                        error: Some(reason),
                        ..Default::default()
                    },
                );
                persist(state, job_id, current, &failed, None).await?;
                return Ok(());
            }
            Err(err) => {
                // Transient poll errors burn an attempt but keep the loop.
                tracing::warn!(job_id = %job_id, error = %err, "generator poll errored");
            }
        }
    }

    let timed_out = transition(
        current,
        ReportStatus::Timeout,
        StateUpdate {
            error: Some("generation did not finish in time".to_string()),
            ..Default::default()
        },
    );
    persist(state, job_id, current, &timed_out, None).await?;
    Ok(())
}

/// Writes a machine-produced state behind the optimistic status guard.
///
/// A state the machine absorbed (status unchanged) is never written, and a
/// lost guard means a concurrent writer got there first; both come back as
/// `false` and the caller leaves the job alone.
async fn persist(
    state: &AppState,
    job_id: Uuid,
    previous: &JobState,
    next: &JobState,
    sections: Option<&serde_json::Value>,
) -> Result<bool, String> {
    if next.status == previous.status {
        return Ok(false);
    }

    let db = state.db.lock().await;
    let applied =
        db::apply_transition(&db, job_id, previous.status.as_str(), next, sections).await?;
    if !applied {
        tracing::warn!(
            job_id = %job_id,
            from = previous.status.as_str(),
            to = next.status.as_str(),
            "transition lost optimistic race"
        );
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::{request_fingerprint, shape_sections};
    use serde_json::json;

    #[test]
    fn fingerprint_is_stable_across_key_order() {
        let a = json!({"date": "1991-03-14", "time": "04:20", "place": "Pune"});
        let b = json!({"place": "Pune", "time": "04:20", "date": "1991-03-14"});
        assert_eq!(
            request_fingerprint("life-summary", &a),
            request_fingerprint("life-summary", &b)
        );
    }

    #[test]
    fn fingerprint_separates_types_and_payloads() {
        let details = json!({"date": "1991-03-14"});
        assert_ne!(
            request_fingerprint("life-summary", &details),
            request_fingerprint("year-analysis", &details)
        );
        assert_ne!(
            request_fingerprint("life-summary", &details),
            request_fingerprint("life-summary", &json!({"date": "1991-03-15"}))
        );
    }

    fn sections(n: usize) -> serde_json::Value {
        serde_json::Value::Array(
            (0..n)
                .map(|i| json!({"title": format!("section {i}")}))
                .collect(),
        )
    }

    #[test]
    fn free_tier_is_cut_at_the_gate() {
        let content = sections(8);
        let (total, revealed, shaped) = shape_sections("free", Some(&content));
        assert_eq!(total, Some(8));
        assert_eq!(revealed, Some(6));
        assert_eq!(shaped.unwrap().len(), 6);
    }

    #[test]
    fn short_free_reports_are_not_cut() {
        let content = sections(3);
        let (total, revealed, shaped) = shape_sections("free", Some(&content));
        assert_eq!(total, Some(3));
        assert_eq!(revealed, Some(3));
        assert_eq!(shaped.unwrap().len(), 3);
    }

    #[test]
    fn paid_tier_passes_through() {
        let content = sections(20);
        let (total, revealed, shaped) = shape_sections("paid", Some(&content));
        assert_eq!(total, Some(20));
        assert_eq!(revealed, Some(20));
        assert_eq!(shaped.unwrap().len(), 20);
    }

    #[test]
    fn missing_content_shapes_to_nothing() {
        let (total, revealed, shaped) = shape_sections("free", None);
        assert_eq!(total, None);
        assert_eq!(revealed, None);
        assert!(shaped.is_none());
    }
}
