use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One exchange rate relative to the snapshot's base currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    pub code: String,
    pub value: f64,
}

/// Immutable, timestamped set of exchange rates.
///
/// Produced by the rate service on a cache miss and replaced wholesale on
/// refresh; nothing mutates a snapshot in place. When `fallback` is set the
/// rates are the hardcoded table and `success` is false.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateSnapshot {
    pub success: bool,
    pub base: String,
    pub rates: HashMap<String, RateEntry>,
    pub last_updated: DateTime<Utc>,
    pub fallback: bool,
}

/// Display shape for the rate listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedRate {
    pub code: String,
    pub rate: f64,
    pub symbol: String,
}
