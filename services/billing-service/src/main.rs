mod app;
mod handlers;
mod models;
mod provider;
mod service;
mod state;
mod store;

use std::{sync::Arc, time::Duration};

use siderea_common::{bind_listener, env_or, init_tracing, shutdown_signal};
use tokio_postgres::NoTls;

use crate::provider::{HttpPaymentProvider, ProviderConfig};
use crate::state::AppState;
use crate::store::PostgresBillingStore;

#[tokio::main]
async fn main() {
    let _guards = init_tracing("billing-service");

    let port = env_or("PORT", 8081u16);
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL is required");

    let provider = build_provider().expect("provider config");

    let (db, connection) = tokio_postgres::connect(&database_url, NoTls)
        .await
        .expect("connect db");
    tokio::spawn(async move {
        // Drive the connection in the background.
        if let Err(err) = connection.await {
            tracing::error!(error = %err, "database connection error");
        }
    });

    let db = Arc::new(tokio::sync::Mutex::new(db));
    let state = AppState {
        provider: Arc::new(provider),
        store: Arc::new(PostgresBillingStore::new(db)),
    };

    let app = app::build_router(state);
    let listener = bind_listener(port).await;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("serve");
}

fn build_provider() -> Result<HttpPaymentProvider, String> {
    let base_url = std::env::var("PROVIDER_BASE_URL")
        .map_err(|_| "PROVIDER_BASE_URL is required".to_string())?;
    let api_key = std::env::var("PROVIDER_API_KEY").unwrap_or_default();
    let timeout = env_or("PROVIDER_TIMEOUT_SECS", 15u64);

    HttpPaymentProvider::new(ProviderConfig {
        base_url,
        api_key,
        timeout: Duration::from_secs(timeout),
    })
}
