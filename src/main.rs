mod auth;
mod config;
mod currency;
mod donations;
mod entities;
mod http;
mod models;
mod session;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use chrono::Utc;
use migration::MigratorTrait;
use sea_orm::{ActiveValue, ColumnTrait, ConnectOptions, Database, EntityTrait, QueryFilter};
use secrecy::ExposeSecret;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::ApiConfig;
use crate::currency::{HttpRateFetcher, RateService};
use crate::entities::user;
use crate::session::SessionStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = ApiConfig::load().context("Failed to load configuration")?;
    let database = connect_database(&config).await?;
    run_migrations(&database).await?;
    seed_admin_user(&database, &config).await?;

    let fetcher = Arc::new(
        HttpRateFetcher::new(&config.currency).context("Failed to initialize rate fetcher")?,
    );
    let rates = Arc::new(RateService::new(&config.currency, fetcher));
    let sessions = Arc::new(SessionStore::new(&config.session));
    let app_state = AppState::new(
        database,
        rates,
        sessions,
        config.currency.base_currency.clone(),
    );

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!("Caritas API listening on {local_addr}");

    let router: Router = http::router(app_state);
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server exited with error")?;

    Ok(())
}

fn init_tracing() {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .compact()
        .init();
}

async fn connect_database(config: &ApiConfig) -> Result<sea_orm::DatabaseConnection> {
    let mut options = ConnectOptions::new(config.database.url.clone());
    options
        .max_connections(config.database.max_connections)
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .acquire_timeout(Duration::from_secs(10));

    if let Some(min) = config.database.min_connections {
        options.min_connections(min);
    }

    assert!(
        config.database.max_connections >= config.database.min_connections.unwrap_or(1),
        "Max connections must be >= min connections"
    );
    assert!(
        config.database.max_connections <= 128,
        "Connection pool oversized"
    );

    Database::connect(options)
        .await
        .context("Failed to connect to PostgreSQL")
}

async fn run_migrations(database: &sea_orm::DatabaseConnection) -> Result<()> {
    migration::Migrator::up(database, None)
        .await
        .context("Database migrations failed")
}

/// Provision the admin account when configured and absent. Admin users are
/// otherwise read-only from this application's perspective; there is no
/// registration endpoint.
async fn seed_admin_user(database: &sea_orm::DatabaseConnection, config: &ApiConfig) -> Result<()> {
    let Some(seed) = &config.admin_seed else {
        return Ok(());
    };

    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(seed.email.as_str()))
        .one(database)
        .await
        .context("Admin seed lookup failed")?;
    if existing.is_some() {
        return Ok(());
    }

    let password_hash = auth::hash_password(seed.password.expose_secret())
        .context("Failed to hash seed admin password")?;
    let admin = user::ActiveModel {
        id: ActiveValue::NotSet,
        name: ActiveValue::Set(seed.name.clone()),
        email: ActiveValue::Set(seed.email.clone()),
        password: ActiveValue::Set(password_hash),
        is_admin: ActiveValue::Set(true),
        created_at: ActiveValue::Set(Utc::now().fixed_offset()),
    };
    user::Entity::insert(admin)
        .exec(database)
        .await
        .context("Admin seed insert failed")?;
    info!("Seeded admin user {}", seed.email);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Shutdown signal received");
}
