use std::sync::Arc;

use careline_agent::{AgentService, CompletionGateway, OpenAiCompletionClient, Retriever};
use careline_core::config::{AppConfig, ConfigError, LoadOptions};
use careline_db::{connect, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<AgentService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("completion client setup failed: {0}")]
    Completion(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let client = OpenAiCompletionClient::from_config(&config.llm)
        .map_err(|error| BootstrapError::Completion(error.to_string()))?;
    let gateway = CompletionGateway::new(Arc::new(client), config.llm.max_retries);
    let retriever = Retriever::from_config(&config.retrieval);
    let service = Arc::new(AgentService::new(db_pool.clone(), gateway, retriever));

    Ok(Application { config, db_pool, service })
}
