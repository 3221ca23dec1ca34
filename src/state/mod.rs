use std::sync::Arc;
use std::time::Instant;

use sea_orm::DatabaseConnection;

use crate::currency::RateService;
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub database: Arc<DatabaseConnection>,
    pub rates: Arc<RateService>,
    pub sessions: Arc<SessionStore>,
    pub base_currency: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        database: DatabaseConnection,
        rates: Arc<RateService>,
        sessions: Arc<SessionStore>,
        base_currency: String,
    ) -> Self {
        assert_eq!(
            base_currency.len(),
            3,
            "Base currency must be a 3-letter code"
        );
        assert_eq!(
            rates.base_currency(),
            base_currency,
            "Rate service and state must agree on the base currency"
        );
        Self {
            database: Arc::new(database),
            rates,
            sessions,
            base_currency,
            start_time: Instant::now(),
        }
    }
}
