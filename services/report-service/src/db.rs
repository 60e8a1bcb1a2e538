use chrono::{DateTime, Utc};
use tokio_postgres::{Client, GenericClient};
use uuid::Uuid;

use crate::lifecycle::JobState;

const JOB_COLUMNS: &str = "id, fingerprint, report_type, tier, status, report_id, error, \
started_at, birth_details, sections, created_at, updated_at";

const SQL_INSERT_JOB: &str = "INSERT INTO report_jobs \
(id, fingerprint, report_type, tier, status, birth_details) \
VALUES ($1, $2, $3, $4, $5, $6) \
RETURNING id, fingerprint, report_type, tier, status, report_id, error, \
started_at, birth_details, sections, created_at, updated_at";

const SQL_SELECT_JOB: &str = "SELECT id, fingerprint, report_type, tier, status, report_id, error, \
started_at, birth_details, sections, created_at, updated_at \
FROM report_jobs WHERE id = $1";

// The status guard makes concurrent writers lose cleanly: whoever persisted
// first wins and the late update touches zero rows.
const SQL_APPLY_TRANSITION: &str = "UPDATE report_jobs \
SET status = $2, report_id = $3, error = $4, started_at = $5, \
sections = COALESCE($6, sections), updated_at = NOW() \
WHERE id = $1 AND status = $7";

pub struct ReportJobRow {
    pub id: Uuid,
    pub fingerprint: String,
    pub report_type: String,
    pub tier: String,
    pub status: String,
    pub report_id: Option<Uuid>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub birth_details: serde_json::Value,
    pub sections: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn map_job(row: &tokio_postgres::Row) -> ReportJobRow {
    ReportJobRow {
        id: row.get("id"),
        fingerprint: row.get("fingerprint"),
        report_type: row.get("report_type"),
        tier: row.get("tier"),
        status: row.get("status"),
        report_id: row.get("report_id"),
        error: row.get("error"),
        started_at: row.get("started_at"),
        birth_details: row.get("birth_details"),
        sections: row.get("sections"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub async fn insert_job(
    db: &impl GenericClient,
    id: Uuid,
    fingerprint: &str,
    report_type: &str,
    tier: &str,
    status: &str,
    birth_details: &serde_json::Value,
) -> Result<ReportJobRow, String> {
    let row = db
        .query_one(
            SQL_INSERT_JOB,
            &[&id, &fingerprint, &report_type, &tier, &status, birth_details],
        )
        .await
        .map_err(|err| format!("insert job failed: {err}"))?;
    Ok(map_job(&row))
}

pub async fn select_job(db: &Client, id: Uuid) -> Result<Option<ReportJobRow>, String> {
    let row = db
        .query_opt(SQL_SELECT_JOB, &[&id])
        .await
        .map_err(|err| format!("select job failed: {err}"))?;
    Ok(row.as_ref().map(map_job))
}

pub async fn select_active_by_fingerprint(
    db: &Client,
    fingerprint: &str,
) -> Result<Option<ReportJobRow>, String> {
    let sql = format!(
        "SELECT {JOB_COLUMNS} FROM report_jobs \
         WHERE fingerprint = $1 AND status IN ('verifying', 'generating', 'polling') \
         ORDER BY created_at DESC LIMIT 1"
    );
    let row = db
        .query_opt(sql.as_str(), &[&fingerprint])
        .await
        .map_err(|err| format!("select active job failed: {err}"))?;
    Ok(row.as_ref().map(map_job))
}

pub async fn select_completed_by_fingerprint(
    db: &Client,
    fingerprint: &str,
) -> Result<Option<ReportJobRow>, String> {
    let sql = format!(
        "SELECT {JOB_COLUMNS} FROM report_jobs \
         WHERE fingerprint = $1 AND status = 'completed' \
         ORDER BY updated_at DESC LIMIT 1"
    );
    let row = db
        .query_opt(sql.as_str(), &[&fingerprint])
        .await
        .map_err(|err| format!("select completed job failed: {err}"))?;
    Ok(row.as_ref().map(map_job))
}

/// Persists a state produced by the lifecycle machine, guarded on the status
/// the caller read. Answers whether the update applied.
pub async fn apply_transition(
    db: &Client,
    id: Uuid,
    expected_status: &str,
    state: &JobState,
    sections: Option<&serde_json::Value>,
) -> Result<bool, String> {
    let affected = db
        .execute(
            SQL_APPLY_TRANSITION,
            &[
                &id,
                &state.status.as_str(),
                &state.report_id,
                &state.error,
                &state.started_at,
                &sections,
                &expected_status,
            ],
        )
        .await
        .map_err(|err| format!("apply transition failed: {err}"))?;
    Ok(affected > 0)
}

pub async fn list_processing(db: &Client) -> Result<Vec<ReportJobRow>, String> {
    let sql = format!(
        "SELECT {JOB_COLUMNS} FROM report_jobs \
         WHERE status IN ('verifying', 'generating', 'polling') \
         ORDER BY updated_at"
    );
    let rows = db
        .query(sql.as_str(), &[])
        .await
        .map_err(|err| format!("list processing jobs failed: {err}"))?;
    Ok(rows.iter().map(map_job).collect())
}

pub async fn status_counts(db: &Client) -> Result<Vec<(String, i64)>, String> {
    let rows = db
        .query(
            "SELECT status, COUNT(*) AS count FROM report_jobs GROUP BY status",
            &[],
        )
        .await
        .map_err(|err| format!("status counts failed: {err}"))?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get("status"), row.get("count")))
        .collect())
}
