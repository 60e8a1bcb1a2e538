use std::{sync::Arc, time::Duration};
use tokio::sync::{broadcast, Mutex};
use tokio_postgres::Client;

use crate::generator::GeneratorClient;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Client>>,
    pub generator: Arc<GeneratorClient>,
    pub updates: broadcast::Sender<()>,
    pub stream_interval: Duration,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
}
