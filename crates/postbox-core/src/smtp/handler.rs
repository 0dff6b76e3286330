//! SMTP session handler

use crate::smtp::auth::{
    authenticate_login, authenticate_plain, login_challenge_password, login_challenge_username,
    AuthOutcome,
};
use crate::smtp::delivery::{DeliveryRouter, MessageSink, SinkFactory};
use anyhow::Result;
use postbox_common::types::{EmailAddress, Envelope};
use postbox_storage::CredentialStore;
use std::sync::Arc;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};
use tracing::{debug, info, warn};

/// SMTP session state
#[derive(Debug, Clone, Copy, PartialEq)]
enum SessionState {
    Connected,
    Greeted,
    MailFrom,
    RcptTo,
}

/// Per-connection SMTP session handler.
///
/// Generic over the stream so sessions can be driven through in-memory
/// pipes in tests as well as TCP sockets.
pub struct SmtpHandler {
    hostname: String,
    auth_required: bool,
    max_message_size: usize,
    router: Arc<DeliveryRouter>,
    credentials: Arc<CredentialStore>,
    peer: String,
}

impl SmtpHandler {
    pub fn new(
        hostname: String,
        auth_required: bool,
        max_message_size: usize,
        router: Arc<DeliveryRouter>,
        credentials: Arc<CredentialStore>,
        peer: String,
    ) -> Self {
        Self {
            hostname,
            auth_required,
            max_message_size,
            router,
            credentials,
            peer,
        }
    }

    /// Handle one SMTP session until QUIT or disconnect.
    pub async fn handle<S: AsyncRead + AsyncWrite + Unpin>(self, stream: S) -> Result<()> {
        let (reader, writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut writer = BufWriter::new(writer);

        let mut state = SessionState::Connected;
        let mut envelope = Envelope::default();
        let mut factories: Vec<SinkFactory> = Vec::new();
        let mut authenticated = false;

        self.send_response(&mut writer, 220, &format!("{} ESMTP postbox", self.hostname))
            .await?;

        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                debug!("Client {} disconnected", self.peer);
                break;
            }

            let line = line.trim();
            debug!("SMTP from {}: {}", self.peer, line);

            let (command, args) = parse_command(line);

            match command.to_uppercase().as_str() {
                "HELO" => {
                    envelope.helo = Some(args.to_string());
                    state = SessionState::Greeted;
                    self.send_response(&mut writer, 250, &format!("Hello {}", args))
                        .await?;
                }

                "EHLO" => {
                    envelope.helo = Some(args.to_string());
                    state = SessionState::Greeted;

                    let responses = vec![
                        format!("{} Hello {}", self.hostname, args),
                        format!("SIZE {}", self.max_message_size),
                        "8BITMIME".to_string(),
                        "PIPELINING".to_string(),
                        "ENHANCEDSTATUSCODES".to_string(),
                        "AUTH PLAIN LOGIN".to_string(),
                    ];

                    for (i, resp) in responses.iter().enumerate() {
                        if i == responses.len() - 1 {
                            self.send_response(&mut writer, 250, resp).await?;
                        } else {
                            self.send_response_continue(&mut writer, 250, resp).await?;
                        }
                    }
                }

                "AUTH" => {
                    if state != SessionState::Greeted {
                        self.send_response(&mut writer, 503, "5.5.1 Bad sequence of commands")
                            .await?;
                        continue;
                    }
                    if authenticated {
                        self.send_response(&mut writer, 503, "5.5.1 Already authenticated")
                            .await?;
                        continue;
                    }

                    let mut auth_parts = args.splitn(2, ' ');
                    let mechanism = auth_parts.next().unwrap_or("").to_uppercase();
                    let initial = auth_parts.next().map(str::to_string);

                    let outcome = match mechanism.as_str() {
                        "PLAIN" => {
                            let payload = match initial {
                                Some(p) => Some(p),
                                None => {
                                    self.send_response(&mut writer, 334, "").await?;
                                    self.read_auth_line(&mut reader).await?
                                }
                            };
                            match payload {
                                Some(p) => Some(authenticate_plain(&self.credentials, &p)),
                                None => None,
                            }
                        }
                        "LOGIN" => {
                            self.send_response(&mut writer, 334, login_challenge_username())
                                .await?;
                            let username = self.read_auth_line(&mut reader).await?;
                            let password = match username {
                                Some(_) => {
                                    self.send_response(&mut writer, 334, login_challenge_password())
                                        .await?;
                                    self.read_auth_line(&mut reader).await?
                                }
                                None => None,
                            };
                            match (username, password) {
                                (Some(u), Some(p)) => {
                                    Some(authenticate_login(&self.credentials, &u, &p))
                                }
                                _ => None,
                            }
                        }
                        _ => {
                            self.send_response(
                                &mut writer,
                                504,
                                "5.5.4 Unrecognized authentication mechanism",
                            )
                            .await?;
                            continue;
                        }
                    };

                    match outcome {
                        None => {
                            // Client cancelled the exchange with "*"
                            self.send_response(&mut writer, 501, "5.7.0 Authentication cancelled")
                                .await?;
                        }
                        Some(AuthOutcome::Accepted(identity)) => {
                            info!("Client {} authenticated as {}", self.peer, identity);
                            authenticated = true;
                            self.send_response(&mut writer, 235, "2.7.0 Authentication successful")
                                .await?;
                        }
                        Some(AuthOutcome::Rejected) => {
                            self.send_response(
                                &mut writer,
                                535,
                                "5.7.8 Authentication credentials invalid",
                            )
                            .await?;
                        }
                        Some(AuthOutcome::Malformed) => {
                            self.send_response(&mut writer, 501, "5.5.2 Invalid credentials encoding")
                                .await?;
                        }
                    }
                }

                "MAIL" => {
                    if state != SessionState::Greeted {
                        self.send_response(&mut writer, 503, "5.5.1 Bad sequence of commands")
                            .await?;
                        continue;
                    }

                    if self.auth_required && !authenticated {
                        self.send_response(&mut writer, 530, "5.7.0 Authentication required")
                            .await?;
                        continue;
                    }

                    if let Some(from_addr) = parse_mail_from(args) {
                        envelope.from =
                            self.router.validate_sender(envelope.helo.as_deref(), from_addr);
                        state = SessionState::MailFrom;
                        self.send_response(&mut writer, 250, "2.1.0 OK").await?;
                    } else {
                        self.send_response(&mut writer, 501, "5.1.7 Bad sender address syntax")
                            .await?;
                    }
                }

                "RCPT" => {
                    if state != SessionState::MailFrom && state != SessionState::RcptTo {
                        self.send_response(&mut writer, 503, "5.5.1 Bad sequence of commands")
                            .await?;
                        continue;
                    }

                    match parse_rcpt_to(args) {
                        Some(to_addr) => match self.router.validate_recipient(&to_addr) {
                            Ok(factory) => {
                                factories.push(factory);
                                envelope.to.push(to_addr);
                                state = SessionState::RcptTo;
                                self.send_response(&mut writer, 250, "2.1.5 OK").await?;
                            }
                            Err(e) => {
                                debug!("Recipient refused for {}: {}", self.peer, e);
                                self.send_response(
                                    &mut writer,
                                    e.smtp_code(),
                                    "5.1.1 Recipient address rejected: domain not accepted",
                                )
                                .await?;
                            }
                        },
                        None => {
                            self.send_response(&mut writer, 501, "5.1.3 Bad recipient address syntax")
                                .await?;
                        }
                    }
                }

                "DATA" => {
                    if state != SessionState::RcptTo || factories.is_empty() {
                        self.send_response(&mut writer, 503, "5.5.1 Bad sequence of commands")
                            .await?;
                        continue;
                    }

                    self.send_response(&mut writer, 354, "Start mail input; end with <CRLF>.<CRLF>")
                        .await?;

                    let mut sinks: Vec<MessageSink> =
                        factories.iter().map(|f| f.open()).collect();

                    // The protocol layer contributes the trace line as the
                    // first delivered line of every copy.
                    let received = self.router.received_header(envelope.helo.as_deref());
                    for sink in &mut sinks {
                        sink.on_line(received.as_bytes());
                    }

                    match self.read_data(&mut reader, &mut sinks).await? {
                        DataOutcome::Aborted => {
                            debug!("Client {} dropped mid-DATA, delivery discarded", self.peer);
                            return Ok(());
                        }
                        DataOutcome::Oversize => {
                            for sink in &mut sinks {
                                sink.on_connection_lost();
                            }
                            self.send_response(&mut writer, 552, "5.3.4 Message too large")
                                .await?;
                        }
                        DataOutcome::Complete => {
                            let mut failed = false;
                            for sink in &mut sinks {
                                match sink.on_end_of_message().await {
                                    Ok(path) => {
                                        info!(
                                            "Message from {} stored at {}",
                                            self.peer,
                                            path.display()
                                        );
                                    }
                                    Err(e) => {
                                        warn!("Failed to store message: {}", e);
                                        failed = true;
                                    }
                                }
                            }

                            if failed {
                                self.send_response(
                                    &mut writer,
                                    451,
                                    "4.3.0 Temporary failure storing message",
                                )
                                .await?;
                            } else {
                                self.send_response(
                                    &mut writer,
                                    250,
                                    "2.0.0 OK: message accepted for delivery",
                                )
                                .await?;
                            }
                        }
                    }

                    state = SessionState::Greeted;
                    envelope.reset();
                    factories.clear();
                }

                "RSET" => {
                    envelope.reset();
                    factories.clear();
                    if state != SessionState::Connected {
                        state = SessionState::Greeted;
                    }
                    self.send_response(&mut writer, 250, "2.0.0 OK").await?;
                }

                "NOOP" => {
                    self.send_response(&mut writer, 250, "2.0.0 OK").await?;
                }

                "QUIT" => {
                    self.send_response(&mut writer, 221, "2.0.0 Bye").await?;
                    break;
                }

                "VRFY" => {
                    self.send_response(&mut writer, 252, "2.5.2 Cannot VRFY user")
                        .await?;
                }

                "EXPN" => {
                    self.send_response(&mut writer, 502, "5.5.1 EXPN not supported")
                        .await?;
                }

                _ => {
                    self.send_response(&mut writer, 500, "5.5.2 Command not recognized")
                        .await?;
                }
            }
        }

        Ok(())
    }

    /// Read the DATA section line by line, feeding every open sink.
    async fn read_data<R: AsyncBufRead + Unpin>(
        &self,
        reader: &mut R,
        sinks: &mut [MessageSink],
    ) -> Result<DataOutcome> {
        let mut line = String::new();
        let mut total = 0usize;
        let mut oversize = false;

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                for sink in sinks.iter_mut() {
                    sink.on_connection_lost();
                }
                return Ok(DataOutcome::Aborted);
            }

            let text = line.trim_end_matches(|c| c == '\r' || c == '\n');

            if text == "." {
                return Ok(if oversize {
                    DataOutcome::Oversize
                } else {
                    DataOutcome::Complete
                });
            }

            // Transparency: the sender doubles leading dots, strip one back.
            let text = text.strip_prefix('.').unwrap_or(text);

            total += text.len() + 1;
            if total > self.max_message_size {
                oversize = true;
                continue;
            }

            for sink in sinks.iter_mut() {
                sink.on_line(text.as_bytes());
            }
        }
    }

    /// Read one line of an AUTH exchange; `*` cancels per RFC 4954.
    async fn read_auth_line<R: AsyncBufRead + Unpin>(
        &self,
        reader: &mut R,
    ) -> Result<Option<String>> {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            anyhow::bail!("Connection closed during AUTH");
        }
        let line = line.trim();
        if line == "*" {
            Ok(None)
        } else {
            Ok(Some(line.to_string()))
        }
    }

    /// Send an SMTP response
    async fn send_response<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut BufWriter<W>,
        code: u16,
        message: &str,
    ) -> Result<()> {
        let response = format!("{} {}\r\n", code, message);
        writer.write_all(response.as_bytes()).await?;
        writer.flush().await?;
        debug!("SMTP to {}: {}", self.peer, response.trim());
        Ok(())
    }

    /// Send a multi-line response (intermediate line)
    async fn send_response_continue<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut BufWriter<W>,
        code: u16,
        message: &str,
    ) -> Result<()> {
        let response = format!("{}-{}\r\n", code, message);
        writer.write_all(response.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

enum DataOutcome {
    Complete,
    Oversize,
    Aborted,
}

/// Parse an SMTP command line into command and arguments
fn parse_command(line: &str) -> (&str, &str) {
    let parts: Vec<&str> = line.splitn(2, ' ').collect();
    (parts.first().unwrap_or(&""), parts.get(1).unwrap_or(&""))
}

/// Parse MAIL FROM:<address> or MAIL FROM: <address>
fn parse_mail_from(args: &str) -> Option<Option<EmailAddress>> {
    let args = args.trim();

    let addr_part = if args.to_uppercase().starts_with("FROM:") {
        &args[5..]
    } else {
        return None;
    };

    let addr_part = addr_part.trim();

    // Null sender <>
    if addr_part == "<>" {
        return Some(None);
    }

    let email = if addr_part.starts_with('<') && addr_part.contains('>') {
        let end = addr_part.find('>')?;
        &addr_part[1..end]
    } else {
        addr_part.split_whitespace().next()?
    };

    if email.is_empty() {
        Some(None)
    } else {
        Some(EmailAddress::parse(email))
    }
}

/// Parse RCPT TO:<address>
fn parse_rcpt_to(args: &str) -> Option<EmailAddress> {
    let args = args.trim();

    let addr_part = if args.to_uppercase().starts_with("TO:") {
        &args[3..]
    } else {
        return None;
    };

    let addr_part = addr_part.trim();

    let email = if addr_part.starts_with('<') && addr_part.contains('>') {
        let end = addr_part.find('>')?;
        &addr_part[1..end]
    } else {
        addr_part.split_whitespace().next()?
    };

    EmailAddress::parse(email)
}
