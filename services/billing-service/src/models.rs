use serde::{Deserialize, Serialize};

use crate::store::SubscriptionRecord;

#[derive(Deserialize)]
pub struct VerifySessionRequest {
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct VerifySessionResponse {
    pub status: &'static str,
    pub subscription: SubscriptionView,
}

#[derive(Serialize)]
pub struct SubscriptionView {
    pub session_id: String,
    pub subscription_id: String,
    pub status: String,
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<String>,
}

impl SubscriptionView {
    pub fn from_record(record: &SubscriptionRecord) -> Self {
        Self {
            session_id: record.session_id.clone(),
            subscription_id: record.subscription_id.clone(),
            status: record.status.clone(),
            cancel_at_period_end: record.cancel_at_period_end,
            current_period_end: record.current_period_end.map(|end| end.to_rfc3339()),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: &'static str,
}
