use std::sync::Arc;

use reimburse_core::config::{AppConfig, ConfigError, LoadOptions};
use reimburse_core::currency::{CurrencyConverter, IdentityConverter};
use reimburse_core::engine::{ApprovalEngine, EngineSettings};
use reimburse_db::repositories::{SqlEmployeeDirectory, SqlExpenseRepository, SqlPolicyRepository};
use reimburse_db::{connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::currency::HttpRateConverter;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<ApprovalEngine>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("exchange-rate client could not be built: {0}")]
    RateClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let converter: Arc<dyn CurrencyConverter> =
        match HttpRateConverter::from_config(&config.currency).map_err(BootstrapError::RateClient)? {
            Some(client) => Arc::new(client),
            None => Arc::new(IdentityConverter),
        };
    info!(
        event_name = "system.bootstrap.currency_configured",
        correlation_id = "bootstrap",
        provider = if config.currency.enabled { "http" } else { "identity" },
        "currency conversion configured"
    );

    let engine = ApprovalEngine::new(
        Arc::new(SqlExpenseRepository::new(db_pool.clone())),
        Arc::new(SqlPolicyRepository::new(db_pool.clone())),
        Arc::new(SqlEmployeeDirectory::new(db_pool.clone())),
        converter,
    )
    .with_settings(EngineSettings {
        enforce_approver_eligibility: config.workflow.enforce_approver_eligibility,
        conversion_timeout: config.currency.timeout(),
    });

    Ok(Application { config, db_pool, engine: Arc::new(engine) })
}
