//! Directory-backed mailbox
//!
//! A [`Mailbox`] maps one directory to a UID-indexed message list. There is
//! no persisted index: every listing, fetch or count operation re-scans the
//! directory, so results always reflect the directory state at call time and
//! UIDs are only stable between two scans if nothing was added or removed.

use crate::message::StoredMessage;
use postbox_common::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Selector for [`Mailbox::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSelector {
    /// A single UID (`"7"`)
    Uid(u32),
    /// An inclusive UID range (`"2:5"`)
    Range(u32, u32),
    /// A lower-bounded selector (`"3:*"`). Resolves to exactly the first
    /// UID, not to everything at or above it.
    From(u32),
}

impl MessageSelector {
    /// Parse selector text. Anything outside the three recognized shapes is
    /// a selector error.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if let Some((first, rest)) = s.split_once(':') {
            let first: u32 = first
                .parse()
                .map_err(|_| Error::Selector(s.to_string()))?;
            if rest == "*" {
                return Ok(MessageSelector::From(first));
            }
            let last: u32 = rest
                .parse()
                .map_err(|_| Error::Selector(s.to_string()))?;
            return Ok(MessageSelector::Range(first, last));
        }

        s.parse()
            .map(MessageSelector::Uid)
            .map_err(|_| Error::Selector(s.to_string()))
    }

    /// Whether a UID is resolved by this selector.
    pub fn resolves(&self, uid: u32) -> bool {
        match self {
            MessageSelector::Uid(n) => uid == *n,
            MessageSelector::Range(first, last) => uid >= *first && uid <= *last,
            MessageSelector::From(first) => uid == *first,
        }
    }
}

/// A mailbox bound to exactly one directory.
#[derive(Debug, Clone)]
pub struct Mailbox {
    dir: PathBuf,
}

impl Mailbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Scan the directory and build the UID map: regular files only, sorted
    /// lexicographically by name, numbered from 1.
    async fn rescan(&self) -> Result<BTreeMap<u32, StoredMessage>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            Error::Storage(format!("Failed to scan {}: {}", self.dir.display(), e))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            Error::Storage(format!("Failed to scan {}: {}", self.dir.display(), e))
        })? {
            let file_type = entry.file_type().await.map_err(|e| {
                Error::Storage(format!("Failed to scan {}: {}", self.dir.display(), e))
            })?;
            if file_type.is_file() {
                files.push((entry.file_name(), entry.path()));
            }
        }
        files.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut messages = BTreeMap::new();
        for (uid, (_, path)) in (1u32..).zip(files) {
            messages.insert(uid, StoredMessage::new(uid, path));
        }

        debug!(dir = %self.dir.display(), count = messages.len(), "Scanned mailbox");
        Ok(messages)
    }

    /// All messages, keyed by UID. Rescans first.
    pub async fn list_messages(&self) -> Result<BTreeMap<u32, StoredMessage>> {
        self.rescan().await
    }

    /// Fetch the messages a selector resolves to. Rescans first; UIDs the
    /// selector names but the scan does not contain are silently omitted.
    pub async fn fetch(
        &self,
        selector: &MessageSelector,
    ) -> Result<Vec<(u32, StoredMessage)>> {
        let messages = self.rescan().await?;
        Ok(messages
            .into_iter()
            .filter(|(uid, _)| selector.resolves(*uid))
            .collect())
    }

    /// Current message count. Rescans first.
    pub async fn message_count(&self) -> Result<usize> {
        Ok(self.rescan().await?.len())
    }

    /// Recent tracking is not modeled; always 0.
    pub fn recent_count(&self) -> u32 {
        0
    }

    /// Unseen tracking is not modeled; always 0.
    pub fn unseen_count(&self) -> u32 {
        0
    }

    /// Constant for the lifetime of the mailbox object. Sufficient only
    /// because mailboxes are not destroyed and recreated with different UID
    /// assignments within one session.
    pub fn uid_validity(&self) -> u32 {
        1
    }

    /// Succeeds immediately and deletes nothing; messages are never removed
    /// from disk by this path.
    pub async fn expunge(&self) -> Result<Vec<u32>> {
        Ok(Vec::new())
    }

    pub fn is_writeable(&self) -> bool {
        true
    }

    pub fn hierarchy_delimiter(&self) -> &'static str {
        "/"
    }
}
