use std::sync::Arc;

use crate::provider::PaymentProvider;
use crate::store::BillingStore;

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn PaymentProvider>,
    pub store: Arc<dyn BillingStore>,
}
