use std::sync::Arc;

use mailsmith_agent::llm::{DisabledLlmClient, LlmClient, LlmError, OpenAiCompatibleClient};
use mailsmith_agent::pipeline::{EditPipeline, PipelineError};
use mailsmith_core::config::{AppConfig, ConfigError, LoadOptions};
use mailsmith_db::repositories::{SqlDocumentRepository, SqlMessageLogRepository};
use mailsmith_db::{connect, migrations, DbPool};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub pipeline: Arc<EditPipeline>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    Llm(#[from] LlmError),
    #[error("pipeline setup failed: {0}")]
    Pipeline(#[from] PipelineError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// The llm enablement decision is made here, once, and injected.
pub fn build_llm_client(config: &AppConfig) -> Result<Arc<dyn LlmClient>, BootstrapError> {
    if config.llm.is_enabled() {
        let client = OpenAiCompatibleClient::from_config(&config.llm)?;
        info!(
            event_name = "system.bootstrap.llm_enabled",
            correlation_id = "bootstrap",
            provider = ?config.llm.provider,
            model = %config.llm.model,
            endpoint = client.endpoint(),
            "llm provider configured"
        );
        Ok(Arc::new(client))
    } else {
        warn!(
            event_name = "system.bootstrap.llm_disabled",
            correlation_id = "bootstrap",
            "no llm credentials configured; create requests will use the fallback template"
        );
        Ok(Arc::new(DisabledLlmClient))
    }
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let llm = build_llm_client(&config)?;
    let pipeline = EditPipeline::new(
        Arc::new(SqlDocumentRepository::new(db_pool.clone())),
        Arc::new(SqlMessageLogRepository::new(db_pool.clone())),
        llm,
        &config,
    )?;

    Ok(Application { config, db_pool, pipeline: Arc::new(pipeline) })
}
