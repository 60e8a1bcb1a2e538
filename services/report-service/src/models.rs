use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct SubmitReportRequest {
    pub report_type: Option<String>,
    pub tier: Option<String>,
    pub birth_details: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct SubmitReportResponse {
    pub status: &'static str,
    pub job_id: String,
    pub job_status: String,
    pub deduplicated: bool,
}

#[derive(Serialize)]
pub struct ReportStatusResponse {
    pub status: &'static str,
    pub job_id: String,
    pub job_status: String,
    pub report_type: String,
    pub tier: String,
    pub report_id: Option<String>,
    pub error: Option<String>,
    pub sections_total: Option<usize>,
    pub sections_revealed: Option<usize>,
    pub sections: Option<Vec<serde_json::Value>>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct ResetReportResponse {
    pub status: &'static str,
    pub job_id: String,
    pub job_status: String,
}

#[derive(Serialize)]
pub struct SweepResponse {
    pub status: &'static str,
    pub scanned: usize,
    pub flagged: usize,
}

#[derive(Default, Serialize)]
pub struct StatusCounts {
    pub idle: u64,
    pub verifying: u64,
    pub generating: u64,
    pub polling: u64,
    pub completed: u64,
    pub failed: u64,
    pub timeout: u64,
}

#[derive(Serialize)]
pub struct LiveSummary {
    pub updated_at: String,
    pub jobs: StatusCounts,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}
