use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::Client;

use crate::provider::ProviderSession;

/// Locally persisted billing state, keyed by the provider checkout session.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRecord {
    pub session_id: String,
    pub subscription_id: String,
    pub status: String,
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl SubscriptionRecord {
    pub fn from_session(session_id: &str, session: &ProviderSession) -> Self {
        Self {
            session_id: session_id.to_string(),
            subscription_id: session.subscription_id.clone(),
            status: session.status.clone(),
            cancel_at_period_end: session.cancel_at_period_end,
            current_period_end: session.current_period_end,
        }
    }
}

/// Persistence seam for billing records, injected at the composition root.
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Insert-or-update keyed by session id; answers the persisted row
    /// whether it was created or refreshed.
    async fn upsert_by_session(
        &self,
        record: &SubscriptionRecord,
    ) -> Result<SubscriptionRecord, String>;

    async fn find_by_session(&self, session_id: &str)
        -> Result<Option<SubscriptionRecord>, String>;
}

// The unique session_id key is what makes concurrent duplicate verifications
// converge instead of creating a second row.
const SQL_UPSERT_SUBSCRIPTION: &str = "INSERT INTO billing_subscriptions \
(session_id, subscription_id, status, cancel_at_period_end, current_period_end) \
VALUES ($1, $2, $3, $4, $5) \
ON CONFLICT (session_id) DO UPDATE SET subscription_id = EXCLUDED.subscription_id, \
status = EXCLUDED.status, cancel_at_period_end = EXCLUDED.cancel_at_period_end, \
current_period_end = EXCLUDED.current_period_end, updated_at = NOW() \
RETURNING session_id, subscription_id, status, cancel_at_period_end, current_period_end";

const SQL_SELECT_SUBSCRIPTION: &str = "SELECT session_id, subscription_id, status, \
cancel_at_period_end, current_period_end \
FROM billing_subscriptions WHERE session_id = $1";

pub struct PostgresBillingStore {
    db: Arc<Mutex<Client>>,
}

impl PostgresBillingStore {
    pub fn new(db: Arc<Mutex<Client>>) -> Self {
        Self { db }
    }
}

fn map_subscription(row: &tokio_postgres::Row) -> SubscriptionRecord {
    SubscriptionRecord {
        session_id: row.get("session_id"),
        subscription_id: row.get("subscription_id"),
        status: row.get("status"),
        cancel_at_period_end: row.get("cancel_at_period_end"),
        current_period_end: row.get("current_period_end"),
    }
}

#[async_trait]
impl BillingStore for PostgresBillingStore {
    async fn upsert_by_session(
        &self,
        record: &SubscriptionRecord,
    ) -> Result<SubscriptionRecord, String> {
        let db = self.db.lock().await;
        let row = db
            .query_one(
                SQL_UPSERT_SUBSCRIPTION,
                &[
                    &record.session_id,
                    &record.subscription_id,
                    &record.status,
                    &record.cancel_at_period_end,
                    &record.current_period_end,
                ],
            )
            .await
            .map_err(|err| format!("upsert subscription failed: {err}"))?;
        Ok(map_subscription(&row))
    }

    async fn find_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SubscriptionRecord>, String> {
        let db = self.db.lock().await;
        let row = db
            .query_opt(SQL_SELECT_SUBSCRIPTION, &[&session_id])
            .await
            .map_err(|err| format!("select subscription failed: {err}"))?;
        Ok(row.as_ref().map(map_subscription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_mirrors_the_provider_session() {
        let session = ProviderSession {
            subscription_id: "sub_42".to_string(),
            status: "active".to_string(),
            cancel_at_period_end: true,
            current_period_end: None,
        };

        let record = SubscriptionRecord::from_session("cs_42", &session);
        assert_eq!(record.session_id, "cs_42");
        assert_eq!(record.subscription_id, "sub_42");
        assert_eq!(record.status, "active");
        assert!(record.cancel_at_period_end);
        assert!(record.current_period_end.is_none());
    }
}
