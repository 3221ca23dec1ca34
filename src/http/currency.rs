//! Exchange-rate display endpoint.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::models::currency::FormattedRate;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/currency/rates", get(get_rates))
}

/// Formatted rate list for the donation widget. Provider failures never
/// surface here; the fallback table is served instead.
async fn get_rates(State(state): State<AppState>) -> Json<BTreeMap<String, FormattedRate>> {
    Json(state.rates.formatted_rates().await)
}
