use axum::http::StatusCode;

use crate::models::ErrorResponse;
use crate::provider::PaymentProvider;
use crate::store::{BillingStore, SubscriptionRecord};

#[derive(Debug)]
pub struct ServiceError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ServiceError {
    pub fn new(status: StatusCode, code: &'static str, message: &'static str) -> Self {
        Self {
            status,
            body: ErrorResponse { code, message },
        }
    }
}

/// Confirms a checkout session against the provider and persists the derived
/// subscription state.
///
/// Safe to call any number of times for one session: the upsert runs per
/// call but always converges on the provider's answer, so a success-page
/// reload and a webhook racing each other land on the same row.
pub async fn verify_session(
    provider: &dyn PaymentProvider,
    store: &dyn BillingStore,
    session_id: &str,
) -> Result<SubscriptionRecord, ServiceError> {
    let session = provider.fetch_session(session_id).await.map_err(|err| {
        tracing::error!(session_id, error = %err, "provider lookup failed");
        ServiceError::new(
            StatusCode::BAD_GATEWAY,
            "provider_error",
            "payment provider unavailable",
        )
    })?;

    let record = SubscriptionRecord::from_session(session_id, &session);
    let persisted = store.upsert_by_session(&record).await.map_err(|err| {
        tracing::error!(session_id, error = %err, "subscription upsert failed");
        ServiceError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "db_error",
            "database error",
        )
    })?;

    tracing::info!(
        session_id,
        subscription_id = persisted.subscription_id.as_str(),
        subscription_status = persisted.status.as_str(),
        "session verified"
    );
    Ok(persisted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderSession;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct FixedProvider {
        session: ProviderSession,
    }

    #[async_trait]
    impl PaymentProvider for FixedProvider {
        async fn fetch_session(&self, _session_id: &str) -> Result<ProviderSession, String> {
            Ok(self.session.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl PaymentProvider for FailingProvider {
        async fn fetch_session(&self, _session_id: &str) -> Result<ProviderSession, String> {
            Err("connection refused".to_string())
        }
    }

    /// Provider whose answer changes after the first call, for exercising
    /// re-verification against updated upstream state.
    struct ShiftingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PaymentProvider for ShiftingProvider {
        async fn fetch_session(&self, _session_id: &str) -> Result<ProviderSession, String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let mut session = active_session();
            if call > 0 {
                session.cancel_at_period_end = true;
            }
            Ok(session)
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<HashMap<String, SubscriptionRecord>>,
        upserts: AtomicUsize,
    }

    #[async_trait]
    impl BillingStore for MemoryStore {
        async fn upsert_by_session(
            &self,
            record: &SubscriptionRecord,
        ) -> Result<SubscriptionRecord, String> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            let mut records = self.records.lock().await;
            records.insert(record.session_id.clone(), record.clone());
            Ok(record.clone())
        }

        async fn find_by_session(
            &self,
            session_id: &str,
        ) -> Result<Option<SubscriptionRecord>, String> {
            Ok(self.records.lock().await.get(session_id).cloned())
        }
    }

    fn active_session() -> ProviderSession {
        ProviderSession {
            subscription_id: "sub_123".to_string(),
            status: "active".to_string(),
            cancel_at_period_end: false,
            current_period_end: Some(Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn repeated_verification_converges_on_one_record() {
        let provider = FixedProvider {
            session: active_session(),
        };
        let store = MemoryStore::default();

        let first = verify_session(&provider, &store, "cs_1")
            .await
            .expect("first call");
        let after_first = store.find_by_session("cs_1").await.unwrap().unwrap();

        let second = verify_session(&provider, &store, "cs_1")
            .await
            .expect("second call");
        let after_second = store.find_by_session("cs_1").await.unwrap().unwrap();

        // One upsert per call, but a single row that never diverges.
        assert_eq!(store.upserts.load(Ordering::SeqCst), 2);
        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
        assert_eq!(store.records.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn reverification_tracks_provider_changes() {
        let provider = ShiftingProvider {
            calls: AtomicUsize::new(0),
        };
        let store = MemoryStore::default();

        let first = verify_session(&provider, &store, "cs_2")
            .await
            .expect("first call");
        assert!(!first.cancel_at_period_end);

        let second = verify_session(&provider, &store, "cs_2")
            .await
            .expect("second call");
        assert!(second.cancel_at_period_end);

        let persisted = store.find_by_session("cs_2").await.unwrap().unwrap();
        assert_eq!(persisted, second);
        assert_eq!(store.records.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn provider_failure_propagates_without_touching_the_store() {
        let store = MemoryStore::default();

        let err = verify_session(&FailingProvider, &store, "cs_9")
            .await
            .err()
            .expect("provider failure should surface");

        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(store.upserts.load(Ordering::SeqCst), 0);
        assert!(store.find_by_session("cs_9").await.unwrap().is_none());
    }
}
