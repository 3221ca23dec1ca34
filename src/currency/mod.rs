//! Exchange-rate fetching, caching, and conversion.
//!
//! The provider is consulted at most once per freshness window; everything
//! else reads the cached snapshot. A provider failure is absorbed here and
//! turned into the static fallback table — it must never surface as an
//! error to the donor-facing flow.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::warn;

use crate::config::CurrencyConfig;
use crate::models::currency::{FormattedRate, RateEntry, RateSnapshot};

/// Currencies the application understands for conversion display.
pub const SUPPORTED_CURRENCIES: [&str; 4] = ["USD", "EUR", "GBP", "INR"];

/// Fixed key for the single snapshot slot.
const RATES_CACHE_KEY: &str = "currency_exchange_rates";

/// Failure modes of one provider call. Each is absorbed by the rate
/// service and converted to the fallback table; none reaches a donor.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("rate provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rate provider returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("failed to parse rate provider response: {0}")]
    Parse(#[source] reqwest::Error),
}

/// One outbound call to the exchange-rate provider.
///
/// Injectable so the cache and conversion logic can be exercised against
/// scripted fetchers in tests. Implementations convert every transport,
/// status, and parse failure into a typed `Err`; nothing panics or
/// propagates past this boundary.
#[async_trait]
pub trait RateFetcher: Send + Sync {
    async fn fetch(
        &self,
        base: &str,
        targets: &[&str],
    ) -> Result<HashMap<String, RateEntry>, FetchError>;
}

/// Provider response body: `{"data": {"EUR": {"code": "EUR", "value": 0.92}}}`.
#[derive(Debug, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    data: HashMap<String, RateEntry>,
}

pub struct HttpRateFetcher {
    http: Client,
    api_url: String,
    api_key: SecretString,
}

impl HttpRateFetcher {
    pub fn new(config: &CurrencyConfig) -> Result<Self> {
        assert!(!config.api_url.is_empty(), "Provider URL must be provided");
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build provider HTTP client")?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Construct with a pre-built client, e.g. pointed at a mock server.
    pub fn with_client(http: Client, api_url: String, api_key: SecretString) -> Self {
        Self {
            http,
            api_url,
            api_key,
        }
    }
}

#[async_trait]
impl RateFetcher for HttpRateFetcher {
    async fn fetch(
        &self,
        base: &str,
        targets: &[&str],
    ) -> Result<HashMap<String, RateEntry>, FetchError> {
        let response = self
            .http
            .get(&self.api_url)
            .query(&[
                ("apikey", self.api_key.expose_secret()),
                ("base_currency", base),
                ("currencies", targets.join(",").as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let parsed: ProviderResponse = response.json().await.map_err(FetchError::Parse)?;
        Ok(parsed.data)
    }
}

/// Owns the single cached snapshot slot and the conversion arithmetic.
///
/// The slot is the only shared mutable state in the application that
/// crosses request boundaries. Replacement is all-or-nothing: readers see
/// either the previous `Arc` or the new one, never a partial snapshot.
/// Concurrent misses may each fetch; last insert wins.
pub struct RateService {
    fetcher: Arc<dyn RateFetcher>,
    slot: Cache<&'static str, Arc<RateSnapshot>>,
    base_currency: String,
}

impl RateService {
    pub fn new(config: &CurrencyConfig, fetcher: Arc<dyn RateFetcher>) -> Self {
        assert_eq!(
            config.base_currency.len(),
            3,
            "Base currency must be a 3-letter code"
        );
        let slot = Cache::builder()
            .max_capacity(1)
            .time_to_live(config.freshness_window())
            .build();
        Self {
            fetcher,
            slot,
            base_currency: config.base_currency.clone(),
        }
    }

    /// Current snapshot: cached when fresh, otherwise one provider fetch.
    ///
    /// A failed fetch yields the fallback table and leaves the slot empty,
    /// so the next call retries the provider instead of serving a stale
    /// fallback for the remainder of the window.
    pub async fn get_rates(&self) -> Arc<RateSnapshot> {
        if let Some(snapshot) = self.slot.get(RATES_CACHE_KEY).await {
            return snapshot;
        }

        match self
            .fetcher
            .fetch(&self.base_currency, &SUPPORTED_CURRENCIES)
            .await
        {
            Ok(rates) => {
                let snapshot = Arc::new(RateSnapshot {
                    success: true,
                    base: self.base_currency.clone(),
                    rates,
                    last_updated: Utc::now(),
                    fallback: false,
                });
                self.slot.insert(RATES_CACHE_KEY, Arc::clone(&snapshot)).await;
                snapshot
            }
            Err(err) => {
                warn!("Rate provider unavailable, serving fallback table: {err:#}");
                Arc::new(fallback_snapshot())
            }
        }
    }

    /// Convert between currencies via the shared base.
    ///
    /// `from == to` short-circuits without touching the cache. An
    /// unsuccessful snapshot returns the amount unchanged — never guess a
    /// conversion from bad data.
    pub async fn convert(&self, amount: f64, from: &str, to: &str) -> f64 {
        if from == to {
            return amount;
        }
        let snapshot = self.get_rates().await;
        convert_with_snapshot(&snapshot, amount, from, to)
    }

    /// Rate listing for display: code -> {code, rate, symbol}.
    pub async fn formatted_rates(&self) -> BTreeMap<String, FormattedRate> {
        let snapshot = self.get_rates().await;
        snapshot
            .rates
            .iter()
            .map(|(code, entry)| {
                (
                    code.clone(),
                    FormattedRate {
                        code: entry.code.clone(),
                        rate: entry.value,
                        symbol: currency_symbol(&entry.code).to_string(),
                    },
                )
            })
            .collect()
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    pub fn cached_snapshots(&self) -> u64 {
        self.slot.entry_count()
    }
}

pub fn convert_with_snapshot(snapshot: &RateSnapshot, amount: f64, from: &str, to: &str) -> f64 {
    if from == to {
        return amount;
    }
    if !snapshot.success {
        return amount;
    }
    let base_amount = amount / rate_or_base(snapshot, from);
    round_2dp(base_amount * rate_or_base(snapshot, to))
}

/// Missing entries count as base-currency-equivalent so display never
/// breaks on partial provider data; the warning keeps it observable.
fn rate_or_base(snapshot: &RateSnapshot, code: &str) -> f64 {
    match snapshot.rates.get(code) {
        Some(entry) => entry.value,
        None => {
            warn!("No rate for {code} in snapshot, treating as base-equivalent");
            1.0
        }
    }
}

pub fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The hardcoded table served when the provider is unavailable.
pub fn fallback_snapshot() -> RateSnapshot {
    let rates = [
        ("USD", 1.0),
        ("EUR", 0.92),
        ("GBP", 0.79),
        ("INR", 83.12),
    ]
    .into_iter()
    .map(|(code, value)| {
        (
            code.to_string(),
            RateEntry {
                code: code.to_string(),
                value,
            },
        )
    })
    .collect();

    RateSnapshot {
        success: false,
        base: "USD".to_string(),
        rates,
        last_updated: Utc::now(),
        fallback: true,
    }
}

pub fn currency_symbol(code: &str) -> &str {
    match code {
        "USD" => "$",
        "EUR" => "€",
        "GBP" => "£",
        "INR" => "₹",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn test_config() -> CurrencyConfig {
        CurrencyConfig {
            api_url: "http://localhost/latest".to_string(),
            api_key: "test-key".to_string().into(),
            base_currency: "USD".to_string(),
            cache_minutes: 60,
            request_timeout_ms: None,
        }
    }

    fn entries(pairs: &[(&str, f64)]) -> HashMap<String, RateEntry> {
        pairs
            .iter()
            .map(|(code, value)| {
                (
                    code.to_string(),
                    RateEntry {
                        code: code.to_string(),
                        value: *value,
                    },
                )
            })
            .collect()
    }

    fn live_snapshot(pairs: &[(&str, f64)]) -> RateSnapshot {
        RateSnapshot {
            success: true,
            base: "USD".to_string(),
            rates: entries(pairs),
            last_updated: Utc::now(),
            fallback: false,
        }
    }

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RateFetcher for CountingFetcher {
        async fn fetch(
            &self,
            _base: &str,
            _targets: &[&str],
        ) -> Result<HashMap<String, RateEntry>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(entries(&[
                ("USD", 1.0),
                ("EUR", 0.9),
                ("GBP", 0.8),
                ("INR", 83.0),
            ]))
        }
    }

    struct FailingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RateFetcher for FailingFetcher {
        async fn fetch(
            &self,
            _base: &str,
            _targets: &[&str],
        ) -> Result<HashMap<String, RateEntry>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Status(
                reqwest::StatusCode::SERVICE_UNAVAILABLE,
            ))
        }
    }

    struct PanickingFetcher;

    #[async_trait]
    impl RateFetcher for PanickingFetcher {
        async fn fetch(
            &self,
            _base: &str,
            _targets: &[&str],
        ) -> Result<HashMap<String, RateEntry>, FetchError> {
            panic!("fetch must not be called");
        }
    }

    #[test]
    fn test_currency_symbols() {
        assert_eq!(currency_symbol("USD"), "$");
        assert_eq!(currency_symbol("EUR"), "€");
        assert_eq!(currency_symbol("GBP"), "£");
        assert_eq!(currency_symbol("INR"), "₹");
        assert_eq!(currency_symbol("JPY"), "JPY");
    }

    #[test]
    fn test_fallback_table() {
        let snapshot = fallback_snapshot();
        assert!(!snapshot.success);
        assert!(snapshot.fallback);
        assert_eq!(snapshot.base, "USD");
        assert_eq!(snapshot.rates.len(), 4);
        assert_eq!(snapshot.rates["USD"].value, 1.00);
        assert_eq!(snapshot.rates["EUR"].value, 0.92);
        assert_eq!(snapshot.rates["GBP"].value, 0.79);
        assert_eq!(snapshot.rates["INR"].value, 83.12);
    }

    #[test]
    fn test_round_2dp() {
        assert_eq!(round_2dp(1.006), 1.01);
        assert_eq!(round_2dp(1.004), 1.0);
        assert_eq!(round_2dp(83.119999), 83.12);
    }

    #[test]
    fn test_convert_identity() {
        let snapshot = live_snapshot(&[("USD", 1.0), ("EUR", 0.92)]);
        assert_eq!(convert_with_snapshot(&snapshot, 25.0, "EUR", "EUR"), 25.0);
        assert_eq!(convert_with_snapshot(&snapshot, 0.0, "USD", "USD"), 0.0);
    }

    #[test]
    fn test_convert_unsuccessful_snapshot_is_noop() {
        let snapshot = fallback_snapshot();
        assert_eq!(convert_with_snapshot(&snapshot, 25.0, "EUR", "GBP"), 25.0);
    }

    #[test]
    fn test_convert_via_base() {
        let snapshot = live_snapshot(&[("USD", 1.0), ("EUR", 0.92), ("GBP", 0.79)]);
        // 100 EUR -> base = 108.6956..., * 0.79 = 85.8695... -> 85.87
        assert_eq!(convert_with_snapshot(&snapshot, 100.0, "EUR", "GBP"), 85.87);
        assert_eq!(convert_with_snapshot(&snapshot, 100.0, "USD", "EUR"), 92.0);
    }

    #[test]
    fn test_convert_round_trip() {
        let snapshot = live_snapshot(&[("USD", 1.0), ("EUR", 0.92), ("GBP", 0.79), ("INR", 83.12)]);
        let there = convert_with_snapshot(&snapshot, 25.0, "EUR", "INR");
        let back = convert_with_snapshot(&snapshot, there, "INR", "EUR");
        assert!((back - 25.0).abs() < 0.01, "round trip drifted: {back}");
    }

    #[test]
    fn test_convert_missing_rate_defaults_to_base() {
        let snapshot = live_snapshot(&[("USD", 1.0), ("EUR", 0.92)]);
        // JPY is absent: treated as rate 1.0
        assert_eq!(convert_with_snapshot(&snapshot, 50.0, "JPY", "USD"), 50.0);
    }

    #[tokio::test]
    async fn test_get_rates_caches_within_window() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let service = RateService::new(&test_config(), Arc::clone(&fetcher) as Arc<dyn RateFetcher>);

        let first = service.get_rates().await;
        let second = service.get_rates().await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(first.success && second.success);
        assert_eq!(first.rates["EUR"].value, second.rates["EUR"].value);
    }

    #[tokio::test]
    async fn test_fetch_failure_returns_fallback_and_is_not_cached() {
        let fetcher = Arc::new(FailingFetcher {
            calls: AtomicUsize::new(0),
        });
        let service = RateService::new(&test_config(), Arc::clone(&fetcher) as Arc<dyn RateFetcher>);

        let first = service.get_rates().await;
        assert!(!first.success);
        assert!(first.fallback);
        assert_eq!(first.rates.len(), 4);
        assert_eq!(first.rates["INR"].value, 83.12);

        // The fallback never enters the slot, so the provider is retried
        let second = service.get_rates().await;
        assert!(second.fallback);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.cached_snapshots(), 0);
    }

    #[tokio::test]
    async fn test_convert_same_currency_skips_fetch() {
        let service = RateService::new(&test_config(), Arc::new(PanickingFetcher));
        assert_eq!(service.convert(25.0, "EUR", "EUR").await, 25.0);
    }

    fn wiremock_fetcher(uri: &str) -> HttpRateFetcher {
        HttpRateFetcher::with_client(
            Client::new(),
            format!("{uri}/latest"),
            "test-key".to_string().into(),
        )
    }

    #[tokio::test]
    async fn test_http_fetcher_parses_provider_response() {
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let body = serde_json::json!({
            "data": {
                "USD": {"code": "USD", "value": 1.0},
                "EUR": {"code": "EUR", "value": 0.92},
            }
        });
        Mock::given(method("GET"))
            .and(path("/latest"))
            .and(query_param("apikey", "test-key"))
            .and(query_param("base_currency", "USD"))
            .and(query_param("currencies", "USD,EUR,GBP,INR"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let fetcher = wiremock_fetcher(&server.uri());
        let rates = fetcher
            .fetch("USD", &SUPPORTED_CURRENCIES)
            .await
            .expect("fetch succeeds");
        assert_eq!(rates.len(), 2);
        assert_eq!(rates["EUR"].value, 0.92);
        assert_eq!(rates["EUR"].code, "EUR");
    }

    #[tokio::test]
    async fn test_http_fetcher_errors_on_non_success_status() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let fetcher = wiremock_fetcher(&server.uri());
        let result = fetcher.fetch("USD", &SUPPORTED_CURRENCIES).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_http_fetcher_errors_on_malformed_body() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let fetcher = wiremock_fetcher(&server.uri());
        let result = fetcher.fetch("USD", &SUPPORTED_CURRENCIES).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_formatted_rates() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let service = RateService::new(&test_config(), fetcher as Arc<dyn RateFetcher>);

        let formatted = service.formatted_rates().await;
        assert_eq!(formatted.len(), 4);
        assert_eq!(formatted["EUR"].symbol, "€");
        assert_eq!(formatted["EUR"].rate, 0.9);
        assert_eq!(formatted["INR"].code, "INR");
    }
}
