//! IMAP server
//!
//! Serves the directory-backed mailboxes over a tagged-command IMAP4rev1
//! subset: authentication, the single-INBOX mailbox surface, UID-indexed
//! fetches and the no-op maintenance commands.

use super::command::{self, FetchItem, ImapCommand, TaggedCommand};
use super::response::ImapResponse;
use super::session::{ImapSession, SessionState};

use anyhow::Result;
use postbox_storage::{Account, CredentialStore, Mailbox, MessageSelector};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// IMAP server configuration
#[derive(Debug, Clone)]
pub struct ImapServerConfig {
    /// Listen address and port
    pub bind: String,
    /// Hostname for the greeting banner
    pub hostname: String,
    /// Session timeout in minutes
    pub timeout_minutes: i64,
    /// Maximum connections
    pub max_connections: usize,
    /// Storage root the accounts live under
    pub storage_root: PathBuf,
}

/// IMAP server
pub struct ImapServer {
    config: ImapServerConfig,
    credentials: Arc<CredentialStore>,
    connection_semaphore: Arc<Semaphore>,
}

impl ImapServer {
    pub fn new(config: ImapServerConfig, credentials: Arc<CredentialStore>) -> Self {
        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));
        Self {
            config,
            credentials,
            connection_semaphore,
        }
    }

    /// Start the accept loop. Never returns under normal operation.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind).await?;
        info!("IMAP server listening on {}", self.config.bind);

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let permit = match self.connection_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            warn!("IMAP: max connections reached, rejecting {}", addr);
                            continue;
                        }
                    };

                    let config = self.config.clone();
                    let credentials = self.credentials.clone();

                    tokio::spawn(async move {
                        debug!("New IMAP connection from {}", addr);
                        if let Err(e) =
                            Self::handle_connection(stream, config, credentials).await
                        {
                            error!("IMAP connection error from {}: {}", addr, e);
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("IMAP: failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Handle a single IMAP connection.
    pub async fn handle_connection<S: AsyncRead + AsyncWrite + Unpin>(
        stream: S,
        config: ImapServerConfig,
        credentials: Arc<CredentialStore>,
    ) -> Result<()> {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut session = ImapSession::new();

        writer
            .write_all(ImapResponse::greeting(&config.hostname).as_bytes())
            .await?;
        writer.flush().await?;

        let timeout = std::time::Duration::from_secs((config.timeout_minutes * 60) as u64);
        let mut line = String::new();

        loop {
            line.clear();

            let read_result = tokio::time::timeout(timeout, reader.read_line(&mut line)).await;

            match read_result {
                Ok(Ok(0)) => {
                    debug!("IMAP client disconnected");
                    break;
                }
                Ok(Ok(_)) => {
                    debug!("IMAP received: {}", line.trim());

                    let response = match command::parse(&line) {
                        Some(cmd) => {
                            Self::handle_command(cmd, &mut session, &config, &credentials).await
                        }
                        None => "* BAD Invalid command\r\n".to_string(),
                    };

                    writer.write_all(response.as_bytes()).await?;
                    writer.flush().await?;

                    if session.state == SessionState::Logout {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    debug!("IMAP read error: {}", e);
                    break;
                }
                Err(_) => {
                    warn!("IMAP connection timed out");
                    writer
                        .write_all(ImapResponse::bye("Connection timeout").as_bytes())
                        .await?;
                    writer.flush().await?;
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a parsed command, producing the full response text.
    async fn handle_command(
        cmd: TaggedCommand,
        session: &mut ImapSession,
        config: &ImapServerConfig,
        credentials: &CredentialStore,
    ) -> String {
        let tag = &cmd.tag;

        match cmd.command {
            ImapCommand::Capability => format!(
                "{}{}",
                ImapResponse::capability(),
                ImapResponse::ok(tag, "CAPABILITY completed")
            ),

            ImapCommand::Noop => ImapResponse::ok(tag, "NOOP completed"),

            ImapCommand::Logout => {
                session.logout();
                format!(
                    "{}{}",
                    ImapResponse::bye("Logging out"),
                    ImapResponse::ok(tag, "LOGOUT completed")
                )
            }

            ImapCommand::Login { username, password } => {
                Self::handle_login(tag, &username, &password, session, config, credentials).await
            }

            ImapCommand::List { .. } => Self::handle_list(tag, session, false),
            ImapCommand::Lsub { .. } => Self::handle_list(tag, session, true),

            ImapCommand::Select { mailbox } => {
                Self::handle_select(tag, &mailbox, session).await
            }

            ImapCommand::Status { mailbox, items } => {
                Self::handle_status(tag, &mailbox, &items, session).await
            }

            ImapCommand::Create { mailbox } => {
                let account = match require_auth(tag, session) {
                    Ok(a) => a,
                    Err(resp) => return resp,
                };
                match account.create_mailbox(&mailbox).await {
                    Ok(_) => ImapResponse::ok(tag, "CREATE completed"),
                    Err(e) => {
                        warn!("CREATE {} failed: {}", mailbox, e);
                        ImapResponse::no(tag, "Failed to create mailbox")
                    }
                }
            }

            ImapCommand::Delete { mailbox } => {
                let account = match require_auth(tag, session) {
                    Ok(a) => a,
                    Err(resp) => return resp,
                };
                match account.delete_mailbox(&mailbox).await {
                    Ok(()) => ImapResponse::ok(tag, "DELETE completed"),
                    Err(e) => {
                        debug!("DELETE {} failed: {}", mailbox, e);
                        ImapResponse::no(tag, "Failed to delete mailbox")
                    }
                }
            }

            ImapCommand::Subscribe { mailbox } => {
                let account = match require_auth(tag, session) {
                    Ok(a) => a,
                    Err(resp) => return resp,
                };
                account.subscribe(&mailbox);
                ImapResponse::ok(tag, "SUBSCRIBE completed")
            }

            ImapCommand::Unsubscribe { .. } => {
                if let Err(resp) = require_auth(tag, session) {
                    return resp;
                }
                ImapResponse::ok(tag, "UNSUBSCRIBE completed")
            }

            ImapCommand::Fetch {
                sequence,
                items,
                uid,
            } => Self::handle_fetch(tag, &sequence, &items, uid, session).await,

            ImapCommand::Expunge => {
                let mailbox = match require_selected(tag, session) {
                    Ok(m) => m,
                    Err(resp) => return resp,
                };
                match mailbox.expunge().await {
                    Ok(_) => ImapResponse::ok(tag, "EXPUNGE completed"),
                    Err(_) => ImapResponse::no(tag, "EXPUNGE failed"),
                }
            }

            ImapCommand::Close => {
                if !session.is_selected() {
                    return ImapResponse::no(tag, "No mailbox selected");
                }
                session.close_mailbox();
                ImapResponse::ok(tag, "CLOSE completed")
            }

            ImapCommand::Unknown { command } => {
                ImapResponse::bad(tag, &format!("Unknown command: {}", command))
            }
        }
    }

    /// Handle LOGIN: credential check, then account resolution.
    async fn handle_login(
        tag: &str,
        username: &str,
        password: &str,
        session: &mut ImapSession,
        config: &ImapServerConfig,
        credentials: &CredentialStore,
    ) -> String {
        let identity = match credentials.authenticate(username, password) {
            Ok(identity) => identity,
            Err(_) => return ImapResponse::no(tag, "Invalid credentials"),
        };

        match Account::resolve(&identity, &config.storage_root).await {
            Ok(account) => {
                info!("IMAP login for {}", identity);
                session.authenticate(account);
                ImapResponse::ok(tag, "LOGIN completed")
            }
            Err(postbox_common::Error::AddressFormat(_)) => {
                ImapResponse::no(tag, "Invalid account identity")
            }
            Err(e) => {
                error!("Failed to resolve account {}: {}", identity, e);
                ImapResponse::no(tag, "Failed to prepare account storage")
            }
        }
    }

    /// Handle LIST/LSUB: the discoverable surface is always exactly INBOX.
    fn handle_list(tag: &str, session: &mut ImapSession, lsub: bool) -> String {
        let account = match require_auth(tag, session) {
            Ok(a) => a,
            Err(resp) => return resp,
        };

        let mut response = String::new();
        for (name, mailbox) in account.list_mailboxes() {
            let line = if lsub {
                ImapResponse::lsub(&["\\HasNoChildren"], mailbox.hierarchy_delimiter(), &name)
            } else {
                ImapResponse::list(&["\\HasNoChildren"], mailbox.hierarchy_delimiter(), &name)
            };
            response.push_str(&line);
        }

        let completed = if lsub { "LSUB completed" } else { "LIST completed" };
        response.push_str(&ImapResponse::ok(tag, completed));
        response
    }

    /// Handle SELECT/EXAMINE.
    async fn handle_select(tag: &str, mailbox_name: &str, session: &mut ImapSession) -> String {
        let account = match require_auth(tag, session) {
            Ok(a) => a,
            Err(resp) => return resp,
        };

        let mailbox = match account.select_mailbox(mailbox_name) {
            Ok(m) => m,
            Err(_) => return ImapResponse::no(tag, "Mailbox not found"),
        };

        let exists = match mailbox.message_count().await {
            Ok(n) => n as u32,
            Err(e) => {
                error!("Failed to scan mailbox {}: {}", mailbox_name, e);
                return ImapResponse::no(tag, "Failed to scan mailbox");
            }
        };

        let mut response = String::new();
        response.push_str(&ImapResponse::mailbox_flags(&[]));
        response.push_str(&ImapResponse::exists(exists));
        response.push_str(&ImapResponse::recent(mailbox.recent_count()));
        response.push_str(&ImapResponse::uid_validity(mailbox.uid_validity()));
        response.push_str(&ImapResponse::ok(tag, "[READ-WRITE] SELECT completed"));

        session.select(mailbox);
        response
    }

    /// Handle STATUS without changing the selected state.
    async fn handle_status(
        tag: &str,
        mailbox_name: &str,
        items: &[String],
        session: &mut ImapSession,
    ) -> String {
        let account = match require_auth(tag, session) {
            Ok(a) => a,
            Err(resp) => return resp,
        };

        let mailbox = match account.select_mailbox(mailbox_name) {
            Ok(m) => m,
            Err(_) => return ImapResponse::no(tag, "Mailbox not found"),
        };

        let total = match mailbox.message_count().await {
            Ok(n) => n as u32,
            Err(_) => return ImapResponse::no(tag, "Failed to scan mailbox"),
        };

        let mut status_items = Vec::new();
        for item in items {
            match item.as_str() {
                "MESSAGES" => status_items.push(("MESSAGES".to_string(), total)),
                "RECENT" => status_items.push(("RECENT".to_string(), mailbox.recent_count())),
                "UNSEEN" => status_items.push(("UNSEEN".to_string(), mailbox.unseen_count())),
                "UIDVALIDITY" => {
                    status_items.push(("UIDVALIDITY".to_string(), mailbox.uid_validity()))
                }
                "UIDNEXT" => status_items.push(("UIDNEXT".to_string(), total + 1)),
                _ => {}
            }
        }

        format!(
            "{}{}",
            ImapResponse::status(mailbox_name, &status_items),
            ImapResponse::ok(tag, "STATUS completed")
        )
    }

    /// Handle FETCH / UID FETCH.
    ///
    /// UIDs are assigned 1..N per scan, so sequence numbers and UIDs always
    /// coincide here and both forms resolve through the same selector.
    async fn handle_fetch(
        tag: &str,
        sequence: &str,
        items: &[FetchItem],
        uid_mode: bool,
        session: &mut ImapSession,
    ) -> String {
        let mailbox = match require_selected(tag, session) {
            Ok(m) => m,
            Err(resp) => return resp,
        };

        let selector = match MessageSelector::parse(sequence) {
            Ok(s) => s,
            Err(_) => return ImapResponse::bad(tag, "Invalid message set"),
        };

        let messages = match mailbox.fetch(&selector).await {
            Ok(m) => m,
            Err(e) => {
                error!("FETCH scan failed: {}", e);
                return ImapResponse::no(tag, "Failed to scan mailbox");
            }
        };

        let mut response = String::new();

        for (uid, message) in &messages {
            let mut fields: Vec<(String, String)> = Vec::new();

            if uid_mode && !items.contains(&FetchItem::Uid) {
                fields.push(("UID".to_string(), uid.to_string()));
            }

            for item in items {
                match item {
                    FetchItem::Uid => {
                        fields.push(("UID".to_string(), uid.to_string()));
                    }
                    FetchItem::Flags => {
                        let flags = message.flags().join(" ");
                        fields.push(("FLAGS".to_string(), format!("({})", flags)));
                    }
                    FetchItem::Rfc822Size => {
                        fields.push(("RFC822.SIZE".to_string(), message.size().await.to_string()));
                    }
                    FetchItem::BodyStructure => {
                        fields.push((
                            "BODYSTRUCTURE".to_string(),
                            ImapResponse::body_structure(message.size().await),
                        ));
                    }
                    FetchItem::BodyHeader => {
                        let headers = message.headers().await;
                        let mut text = String::new();
                        let mut names: Vec<&String> = headers.keys().collect();
                        names.sort();
                        for name in names {
                            text.push_str(&format!("{}: {}\r\n", name, headers[name]));
                        }
                        text.push_str("\r\n");
                        fields.push((
                            "BODY[HEADER]".to_string(),
                            ImapResponse::literal(text.as_bytes()),
                        ));
                    }
                    FetchItem::Body | FetchItem::BodyPeek | FetchItem::Rfc822 => {
                        let body = match message.body().await {
                            Ok(b) => b,
                            Err(e) => {
                                warn!("Body read failed for UID {}: {}", uid, e);
                                return ImapResponse::no(tag, "Message unavailable");
                            }
                        };
                        let key = match item {
                            FetchItem::Rfc822 => "RFC822",
                            _ => "BODY[]",
                        };
                        fields.push((key.to_string(), ImapResponse::literal(&body)));
                    }
                }
            }

            response.push_str(&ImapResponse::fetch(*uid, &fields));
        }

        response.push_str(&ImapResponse::ok(tag, "FETCH completed"));
        response
    }
}

fn require_auth<'a>(
    tag: &str,
    session: &'a ImapSession,
) -> std::result::Result<&'a Account, String> {
    if !session.is_authenticated() {
        return Err(ImapResponse::no(tag, "Not authenticated"));
    }
    session
        .account
        .as_ref()
        .ok_or_else(|| ImapResponse::no(tag, "Not authenticated"))
}

fn require_selected<'a>(
    tag: &str,
    session: &'a ImapSession,
) -> std::result::Result<&'a Mailbox, String> {
    if !session.is_selected() {
        return Err(ImapResponse::no(tag, "No mailbox selected"));
    }
    session
        .selected
        .as_ref()
        .ok_or_else(|| ImapResponse::no(tag, "No mailbox selected"))
}
