use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub currency: CurrencyConfig,
    pub session: SessionConfig,
    pub admin_seed: Option<AdminSeedConfig>,
}

impl ApiConfig {
    pub fn load() -> Result<Self> {
        let configured_path =
            std::env::var("CARITAS_API_CONFIG").unwrap_or_else(|_| "config/api.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("CARITAS_API_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/api.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        // Environment overrides, e.g. CARITAS_API__CURRENCY__API_KEY, so the
        // provider credential never has to live in a checked-in file
        builder = builder.add_source(
            Environment::with_prefix("CARITAS_API")
                .prefix_separator("__")
                .separator("__"),
        );

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize API configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        assert!(
            !self.database.url.is_empty(),
            "Database URL must be specified"
        );
        assert!(
            self.server.port > 0,
            "Server port must be greater than zero"
        );
        self.currency.ensure_bounds()?;
        self.session.ensure_bounds()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        assert!(self.port < 65535, "HTTP port must be below 65535");
        SocketAddr::new(host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyConfig {
    /// Exchange-rate provider endpoint
    pub api_url: String,
    /// Provider credential, sent as the `apikey` query parameter
    pub api_key: SecretString,
    #[serde(default = "CurrencyConfig::default_base_currency")]
    pub base_currency: String,
    /// Freshness window for the cached rate snapshot, in minutes
    #[serde(default = "CurrencyConfig::default_cache_minutes")]
    pub cache_minutes: u64,
    pub request_timeout_ms: Option<u64>,
}

impl CurrencyConfig {
    pub fn request_timeout(&self) -> Duration {
        let millis = self.request_timeout_ms.unwrap_or(3_000);
        assert!(millis >= 100, "Provider timeout must be at least 100ms");
        assert!(
            millis <= 60_000,
            "Provider timeout cannot exceed 60 seconds"
        );
        Duration::from_millis(millis)
    }

    pub fn freshness_window(&self) -> Duration {
        assert!(self.cache_minutes > 0, "Cache window must be positive");
        Duration::from_secs(self.cache_minutes * 60)
    }

    fn ensure_bounds(&self) -> Result<()> {
        assert!(!self.api_url.is_empty(), "Provider URL must be specified");
        assert_eq!(
            self.base_currency.len(),
            3,
            "Base currency must be a 3-letter code"
        );
        assert!(self.cache_minutes > 0, "Cache window must be positive");
        assert!(
            self.cache_minutes <= 1_440,
            "Cache window cannot exceed one day"
        );
        Ok(())
    }

    fn default_base_currency() -> String {
        "USD".to_string()
    }

    const fn default_cache_minutes() -> u64 {
        60
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "SessionConfig::default_ttl_minutes")]
    pub ttl_minutes: u64,
    #[serde(default = "SessionConfig::default_max_sessions")]
    pub max_sessions: u64,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        assert!(self.ttl_minutes > 0, "Session TTL must be positive");
        Duration::from_secs(self.ttl_minutes * 60)
    }

    fn ensure_bounds(&self) -> Result<()> {
        assert!(self.ttl_minutes > 0, "Session TTL must be positive");
        assert!(
            self.ttl_minutes <= 10_080,
            "Session TTL cannot exceed one week"
        );
        assert!(self.max_sessions >= 1, "Session capacity must be positive");
        Ok(())
    }

    const fn default_ttl_minutes() -> u64 {
        120
    }

    const fn default_max_sessions() -> u64 {
        10_000
    }
}

/// Optional startup seed for the admin account. Admin users are
/// provisioned out-of-band; there is no registration endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminSeedConfig {
    pub name: String,
    pub email: String,
    pub password: SecretString,
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}
