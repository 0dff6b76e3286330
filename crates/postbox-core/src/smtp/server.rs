//! SMTP server

use crate::smtp::delivery::DeliveryRouter;
use crate::smtp::handler::SmtpHandler;
use anyhow::Result;
use postbox_storage::CredentialStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// SMTP server configuration
#[derive(Debug, Clone)]
pub struct SmtpServerConfig {
    /// Hostname for the banner and trace headers
    pub hostname: String,
    /// Bind host
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Domains this server accepts mail for
    pub domains: Vec<String>,
    /// Require authentication before MAIL FROM
    pub auth_required: bool,
    /// Maximum message size in bytes
    pub max_message_size: usize,
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Storage root for delivered mail
    pub storage_root: PathBuf,
}

/// SMTP server: accepts connections and spawns one session handler each.
pub struct SmtpServer {
    config: SmtpServerConfig,
    router: Arc<DeliveryRouter>,
    credentials: Arc<CredentialStore>,
    connection_semaphore: Arc<Semaphore>,
}

impl SmtpServer {
    pub fn new(config: SmtpServerConfig, credentials: Arc<CredentialStore>) -> Self {
        let router = Arc::new(DeliveryRouter::new(
            config.domains.iter().cloned(),
            &config.storage_root,
            config.hostname.clone(),
        ));
        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));
        Self {
            config,
            router,
            credentials,
            connection_semaphore,
        }
    }

    /// Run the accept loop. Never returns under normal operation.
    pub async fn run(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;

        info!(
            "SMTP server listening on {} for domains {:?} (sender validation: accept-all)",
            addr, self.config.domains
        );

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let permit = match self.connection_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            warn!("SMTP: max connections reached, rejecting {}", peer_addr);
                            continue;
                        }
                    };

                    let handler = SmtpHandler::new(
                        self.config.hostname.clone(),
                        self.config.auth_required,
                        self.config.max_message_size,
                        self.router.clone(),
                        self.credentials.clone(),
                        peer_addr.to_string(),
                    );

                    tokio::spawn(async move {
                        if let Err(e) = handler.handle(stream).await {
                            error!("SMTP session error from {}: {}", peer_addr, e);
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("SMTP: failed to accept connection: {}", e);
                }
            }
        }
    }
}
