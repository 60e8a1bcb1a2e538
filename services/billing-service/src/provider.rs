use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Authoritative session state as reported by the payment provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSession {
    pub subscription_id: String,
    pub status: String,
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Lookup seam for the payment provider, injected at the composition root.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn fetch_session(&self, session_id: &str) -> Result<ProviderSession, String>;
}

#[derive(Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

pub struct HttpPaymentProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SessionBody {
    subscription_id: Option<String>,
    status: Option<String>,
    #[serde(default)]
    cancel_at_period_end: bool,
    current_period_end: Option<DateTime<Utc>>,
}

impl HttpPaymentProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, String> {
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
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn fetch_session(&self, session_id: &str) -> Result<ProviderSession, String> {
        let url = format!("{}/v1/checkout/sessions/{session_id}", self.base_url);

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| format!("provider request failed: {err}"))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(format!("session {session_id} not found at provider"));
        }
        if !response.status().is_success() {
            return Err(format!("provider answered {}", response.status()));
        }

        let body: SessionBody = response
            .json()
            .await
            .map_err(|err| format!("decode provider response failed: {err}"))?;

        let subscription_id = body
            .subscription_id
            .ok_or_else(|| "provider session carries no subscription".to_string())?;

        Ok(ProviderSession {
            subscription_id,
            status: body.status.unwrap_or_else(|| "incomplete".to_string()),
            cancel_at_period_end: body.cancel_at_period_end,
            current_period_end: body.current_period_end,
        })
    }
}
