use std::sync::Arc;

use secrecy::SecretString;
use thiserror::Error;
use tracing::info;

use leadflow_core::config::{AppConfig, ConfigError, LoadOptions};
use leadflow_db::repositories::{
    ClientRepository, InvitationRepository, LeadRepository, MessageRepository,
    SqlClientRepository, SqlInvitationRepository, SqlLeadRepository, SqlMessageRepository,
    SqlThreadRepository, ThreadRepository,
};
use leadflow_db::{connect_with_settings, migrations, DbPool};
use leadflow_sync::{AttendeeResolver, BackfillRunner, OutboundSender, Reconciler};
use leadflow_unipile::{GatewayError, UnipileClient};

/// Everything the request handlers need, wired once at startup.
pub struct Services {
    pub clients: Arc<dyn ClientRepository>,
    pub invitations: Arc<dyn InvitationRepository>,
    pub threads: Arc<dyn ThreadRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub reconciler: Reconciler,
    pub sender: OutboundSender,
    pub resolver: AttendeeResolver,
    pub backfill: BackfillRunner,
    pub webhook_secret: Option<SecretString>,
}

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub services: Arc<Services>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("gateway client construction failed: {0}")]
    Gateway(#[source] GatewayError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let gateway =
        Arc::new(UnipileClient::from_config(&config.unipile).map_err(BootstrapError::Gateway)?);

    let clients: Arc<dyn ClientRepository> =
        Arc::new(SqlClientRepository::new(db_pool.clone()));
    let leads: Arc<dyn LeadRepository> = Arc::new(SqlLeadRepository::new(db_pool.clone()));
    let invitations: Arc<dyn InvitationRepository> =
        Arc::new(SqlInvitationRepository::new(db_pool.clone()));
    let threads: Arc<dyn ThreadRepository> =
        Arc::new(SqlThreadRepository::new(db_pool.clone()));
    let messages: Arc<dyn MessageRepository> =
        Arc::new(SqlMessageRepository::new(db_pool.clone()));

    let reconciler = Reconciler::new(clients.clone(), leads.clone());
    let services = Arc::new(Services {
        sender: OutboundSender::new(threads.clone(), messages.clone(), leads, gateway.clone()),
        resolver: AttendeeResolver::new(gateway, threads.clone(), messages.clone()),
        backfill: BackfillRunner::new(invitations.clone(), reconciler.clone()),
        reconciler,
        clients,
        invitations,
        threads,
        messages,
        webhook_secret: config.unipile.webhook_secret.clone(),
    });

    Ok(Application { config, db_pool, services })
}
