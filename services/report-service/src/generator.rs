use serde::Deserialize;
use std::time::Duration;

use crate::staleness::ReportType;

#[derive(Clone)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Client for the upstream astrology generation API.
#[derive(Clone)]
pub struct GeneratorClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// Outcome of asking the upstream to produce a report.
pub enum StartOutcome {
    /// The upstream answered synchronously with the full section list.
    Completed(Vec<serde_json::Value>),
    /// The upstream queued the request; poll with the returned id.
    Accepted { upstream_id: String },
}

pub enum PollOutcome {
    Pending,
    Ready(Vec<serde_json::Value>),
    Failed(String),
}

#[derive(Deserialize)]
struct GenerateBody {
    status: Option<String>,
    job_id: Option<String>,
    #[serde(default)]
    sections: Vec<serde_json::Value>,
    error: Option<String>,
}

impl GeneratorClient {
    pub fn new(config: GeneratorConfig) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| format!("build http client failed: {err}"))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    pub async fn start(
        &self,
        report_type: ReportType,
        birth_details: &serde_json::Value,
    ) -> Result<StartOutcome, String> {
        let url = format!("{}/v1/generate", self.base_url);
        let body = serde_json::json!({
            "report_type": report_type.as_str(),
            "birth_details": birth_details,
        });

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| format!("generator request failed: {err}"))?;

        if !response.status().is_success() {
            return Err(format!("generator answered {}", response.status()));
        }

        let body: GenerateBody = response
            .json()
            .await
            .map_err(|err| format!("decode generator response failed: {err}"))?;

        match body.status.as_deref() {
            Some("accepted") => body
                .job_id
                .map(|upstream_id| StartOutcome::Accepted { upstream_id })
                .ok_or_else(|| "generator accepted without a job id".to_string()),
            _ if !body.sections.is_empty() => Ok(StartOutcome::Completed(body.sections)),
            _ => Err(body
                .error
                .unwrap_or_else(|| "generator returned no sections".to_string())),
        }
    }

    pub async fn poll(&self, upstream_id: &str) -> Result<PollOutcome, String> {
        let url = format!("{}/v1/generate/{upstream_id}", self.base_url);

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| format!("generator poll failed: {err}"))?;

        if !response.status().is_success() {
            return Err(format!("generator answered {}", response.status()));
        }

        let body: GenerateBody = response
            .json()
            .await
            .map_err(|err| format!("decode generator response failed: {err}"))?;

        match body.status.as_deref() {
            Some("pending") | Some("accepted") => Ok(PollOutcome::Pending),
            Some("failed") => Ok(PollOutcome::Failed(body.error.unwrap_or_else(|| {
                "generation failed upstream".to_string()
            }))),
            _ if !body.sections.is_empty() => Ok(PollOutcome::Ready(body.sections)),
            other => Err(format!("unexpected generator status {other:?}")),
        }
    }
}
