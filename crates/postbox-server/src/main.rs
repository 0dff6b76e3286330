//! postbox - mail server entry point

use anyhow::{Context, Result};
use postbox_common::config::{Config, LoggingConfig};
use postbox_core::{ImapServer, ImapServerConfig, SmtpServer, SmtpServerConfig};
use postbox_storage::CredentialStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so the logging section can take effect.
    let config = Config::load()?;
    init_logging(&config.logging);

    info!("Starting postbox mail server...");

    // Fatal startup work: both must succeed before any listener binds.
    let credentials = Arc::new(CredentialStore::load(&config.auth.credentials_path)?);

    std::fs::create_dir_all(&config.storage.path).with_context(|| {
        format!(
            "Failed to create storage root {}",
            config.storage.path.display()
        )
    })?;
    info!(path = %config.storage.path.display(), "Storage root ready");

    // SMTP server
    let smtp_config = SmtpServerConfig {
        hostname: config.server.hostname.clone(),
        host: config.smtp.host.clone(),
        port: config.smtp.port,
        domains: config.smtp.domains.clone(),
        auth_required: config.smtp.auth_required,
        max_message_size: config.smtp.max_message_size,
        max_connections: config.smtp.max_connections,
        storage_root: config.storage.path.clone(),
    };
    let smtp_server = SmtpServer::new(smtp_config, credentials.clone());

    let smtp_handle = tokio::spawn(async move {
        if let Err(e) = smtp_server.run().await {
            tracing::error!("SMTP server error: {}", e);
        }
    });

    // IMAP server
    let imap_config = ImapServerConfig {
        bind: config.imap.bind.clone(),
        hostname: config.server.hostname.clone(),
        timeout_minutes: config.imap.timeout_minutes,
        max_connections: config.imap.max_connections,
        storage_root: config.storage.path.clone(),
    };
    let imap_server = ImapServer::new(imap_config, credentials.clone());

    let imap_handle = tokio::spawn(async move {
        if let Err(e) = imap_server.run().await {
            tracing::error!("IMAP server error: {}", e);
        }
    });

    info!("postbox started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    smtp_handle.abort();
    imap_handle.abort();

    info!("postbox shutdown complete");
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}
