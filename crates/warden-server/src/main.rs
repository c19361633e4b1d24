//! Warden Server — application entry point.
//!
//! Wires the SurrealDB account store, the Redis counter store and the
//! persisting audit sink into a [`CredentialIssuer`], then waits for
//! shutdown. Boundary layers (HTTP, gRPC) embed the issuer.

mod config;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use warden_auth::{AuditSink, CredentialIssuer, RepositoryAuditWriter};
use warden_db::DbManager;
use warden_db::repository::{SurrealAccountRepository, SurrealAuditLogRepository};
use warden_kv::RedisCounterStore;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warden=info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    tracing::info!("Starting Warden server...");

    let config = ServerConfig::from_env().context("loading configuration")?;

    let db = DbManager::connect_and_migrate(&config.db)
        .await
        .context("connecting to SurrealDB")?;
    let store = RedisCounterStore::connect(&config.redis)
        .await
        .context("connecting to Redis")?;

    let audit_writer =
        RepositoryAuditWriter::new(SurrealAuditLogRepository::new(db.client().clone()));
    let (audit, audit_task) = AuditSink::spawn(audit_writer, config.auth.audit_queue_capacity);

    let issuer = CredentialIssuer::new(
        SurrealAccountRepository::new(db.client().clone()),
        store,
        audit,
        config.auth,
    )
    .context("building credential issuer")?;

    tracing::info!(
        access_ttl_secs = issuer.config().access_token_ttl.as_secs(),
        refresh_ttl_secs = issuer.config().refresh_token_ttl.as_secs(),
        max_failed_logins = issuer.config().max_failed_logins,
        "Credential issuer ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutdown requested, draining audit queue");

    // The drain task exits once the last sink handle is gone.
    drop(issuer);
    if let Err(e) = audit_task.await {
        tracing::warn!(error = %e, "Audit task ended abnormally");
    }

    tracing::info!("Warden server stopped.");
    Ok(())
}
