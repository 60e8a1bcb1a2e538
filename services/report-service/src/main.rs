mod app;
mod db;
mod gate;
mod generator;
mod handlers;
mod lifecycle;
mod models;
mod service;
mod staleness;
mod state;

use std::{sync::Arc, time::Duration};

use siderea_common::{bind_listener, env_or, init_tracing, shutdown_signal};
use tokio_postgres::NoTls;

use crate::generator::{GeneratorClient, GeneratorConfig};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let _guards = init_tracing("report-service");

    let port = env_or("PORT", 8080u16);
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL is required");
    let stream_interval = env_or("LIVE_UPDATE_INTERVAL_MS", 5000u64);
    let sweep_interval = env_or("SWEEP_INTERVAL_SECS", 60u64);
    let poll_interval = env_or("GENERATOR_POLL_INTERVAL_MS", 2000u64);
    let poll_max_attempts = env_or("GENERATOR_POLL_MAX_ATTEMPTS", 60u32);

    let generator = build_generator().expect("generator config");

    let (db, connection) = tokio_postgres::connect(&database_url, NoTls)
        .await
        .expect("connect db");
    tokio::spawn(async move {
        // Drive the connection in the background.
        if let Err(err) = connection.await {
            tracing::error!(error = %err, "database connection error");
        }
    });

    let (updates, _) = tokio::sync::broadcast::channel(32);
    let state = AppState {
        db: Arc::new(tokio::sync::Mutex::new(db)),
        generator: Arc::new(generator),
        updates,
        stream_interval: Duration::from_millis(stream_interval),
        poll_interval: Duration::from_millis(poll_interval),
        poll_max_attempts,
    };

    spawn_stale_sweep(state.clone(), Duration::from_secs(sweep_interval));

    let app = app::build_router(state);
    let listener = bind_listener(port).await;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("serve");
}

fn build_generator() -> Result<GeneratorClient, String> {
    let base_url = std::env::var("GENERATOR_BASE_URL")
        .map_err(|_| "GENERATOR_BASE_URL is required".to_string())?;
    let api_key = std::env::var("GENERATOR_API_KEY").unwrap_or_default();
    let timeout = env_or("GENERATOR_TIMEOUT_SECS", 30u64);

    GeneratorClient::new(GeneratorConfig {
        base_url,
        api_key,
        timeout: Duration::from_secs(timeout),
    })
}

fn spawn_stale_sweep(state: AppState, interval: Duration) {
    if interval.is_zero() {
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match service::sweep_stale(&state).await {
                Ok(report) if report.flagged > 0 => {
                    tracing::info!(
                        scanned = report.scanned,
                        flagged = report.flagged,
                        "stale sweep flagged jobs"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(error = err.body.message.as_str(), "stale sweep failed");
                }
            }
        }
    });
}
