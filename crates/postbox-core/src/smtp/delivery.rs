//! Inbound delivery routing
//!
//! The [`DeliveryRouter`] decides which recipients this server accepts mail
//! for; each accepted recipient yields a [`SinkFactory`] that opens a fresh
//! [`MessageSink`] for that one delivery. The sink buffers the message lines
//! and persists them as a single file at end-of-message.

use postbox_common::types::EmailAddress;
use postbox_common::{Error, Result};
use postbox_storage::deposit::{is_safe_component, DepositWriter};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Routes inbound deliveries to per-recipient storage.
#[derive(Debug, Clone)]
pub struct DeliveryRouter {
    domains: HashSet<String>,
    deposit: DepositWriter,
    hostname: String,
}

impl DeliveryRouter {
    pub fn new(
        domains: impl IntoIterator<Item = String>,
        storage_root: impl AsRef<Path>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            domains: domains.into_iter().collect(),
            deposit: DepositWriter::new(storage_root.as_ref()),
            hostname: hostname.into(),
        }
    }

    /// Sender validation accepts every origin unconditionally. This is an
    /// open-relay-style simplification: MAIL FROM is never the gate, only
    /// RCPT TO is.
    pub fn validate_sender(
        &self,
        _helo: Option<&str>,
        origin: Option<EmailAddress>,
    ) -> Option<EmailAddress> {
        origin
    }

    /// Accept a recipient only if its domain is on the allow-list (and its
    /// components cannot escape the storage tree). On acceptance, returns a
    /// factory for this one delivery.
    pub fn validate_recipient(&self, recipient: &EmailAddress) -> Result<SinkFactory> {
        if !self.domains.contains(&recipient.domain) {
            return Err(Error::RecipientRefused(recipient.to_string()));
        }
        if !is_safe_component(&recipient.domain) || !is_safe_component(&recipient.local) {
            return Err(Error::RecipientRefused(recipient.to_string()));
        }

        debug!(recipient = %recipient, "Recipient accepted");
        Ok(SinkFactory {
            deposit: self.deposit.clone(),
            domain: recipient.domain.clone(),
            local: recipient.local.clone(),
        })
    }

    /// The trace line the protocol layer feeds to each sink as the first
    /// delivered line of the message.
    pub fn received_header(&self, helo: Option<&str>) -> String {
        format!(
            "Received: from {} by {}",
            helo.unwrap_or("unknown"),
            self.hostname
        )
    }
}

/// Lazily opens a fresh sink for one accepted delivery.
#[derive(Debug, Clone)]
pub struct SinkFactory {
    deposit: DepositWriter,
    domain: String,
    local: String,
}

impl SinkFactory {
    pub fn open(&self) -> MessageSink {
        MessageSink {
            deposit: self.deposit.clone(),
            domain: self.domain.clone(),
            local: self.local.clone(),
            lines: Vec::new(),
        }
    }

    pub fn recipient(&self) -> String {
        format!("{}@{}", self.local, self.domain)
    }
}

/// Accumulates one inbound message and persists it at end-of-message.
#[derive(Debug)]
pub struct MessageSink {
    deposit: DepositWriter,
    domain: String,
    local: String,
    lines: Vec<String>,
}

impl MessageSink {
    /// Buffer one line. Undecodable byte sequences are replaced rather than
    /// failing the delivery.
    pub fn on_line(&mut self, line: &[u8]) {
        self.lines.push(String::from_utf8_lossy(line).into_owned());
    }

    /// Join the buffered lines with newlines, persist them as one freshly
    /// named file under the recipient directory, and release the buffer.
    /// Write failures propagate so the protocol layer can report a temporary
    /// failure instead of silently dropping the message.
    pub async fn on_end_of_message(&mut self) -> Result<PathBuf> {
        let text = self.lines.join("\n");
        let path = self.deposit.deposit(&self.domain, &self.local, &text).await?;
        self.lines = Vec::new();
        Ok(path)
    }

    /// Connection aborted: a partial message never reaches storage.
    pub fn on_connection_lost(&mut self) {
        self.lines.clear();
    }

    pub fn buffered_lines(&self) -> usize {
        self.lines.len()
    }
}
