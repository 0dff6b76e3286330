//! Account resolution
//!
//! Maps an authenticated identity (`local@domain`) to its mailbox root under
//! the storage tree and exposes the mailbox surface the protocol layer
//! drives: a single discoverable INBOX plus ad-hoc creation and deletion.

use crate::mailbox::Mailbox;
use postbox_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A resolved account, constructed per authenticated session. The underlying
/// directory persists across sessions; the object does not.
#[derive(Debug, Clone)]
pub struct Account {
    identity: String,
    root: PathBuf,
}

impl Account {
    /// Resolve an identity to its mailbox root, creating the directory if
    /// absent. The identity must contain exactly one `@`.
    pub async fn resolve(identity: &str, storage_root: &Path) -> Result<Self> {
        let parts: Vec<&str> = identity.split('@').collect();
        if parts.len() != 2 {
            return Err(Error::AddressFormat(identity.to_string()));
        }
        let (local, domain) = (parts[0], parts[1]);

        let root = storage_root.join(domain).join(local);
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            Error::Storage(format!(
                "Failed to create account root {}: {}",
                root.display(),
                e
            ))
        })?;

        debug!(identity = %identity, root = %root.display(), "Resolved account");
        Ok(Self {
            identity: identity.to_string(),
            root,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Always exactly one entry: INBOX, bound to the account root. Ad-hoc
    /// mailboxes created below are not discoverable here.
    pub fn list_mailboxes(&self) -> Vec<(String, Mailbox)> {
        vec![("INBOX".to_string(), Mailbox::new(&self.root))]
    }

    /// Only `INBOX` resolves.
    pub fn select_mailbox(&self, name: &str) -> Result<Mailbox> {
        if name == "INBOX" {
            Ok(Mailbox::new(&self.root))
        } else {
            Err(Error::MailboxNotFound(name.to_string()))
        }
    }

    /// Create `accountRoot/<name>` and return a mailbox bound to it.
    pub async fn create_mailbox(&self, name: &str) -> Result<Mailbox> {
        let path = self.root.join(name);
        tokio::fs::create_dir_all(&path).await.map_err(|e| {
            Error::Storage(format!("Failed to create mailbox {}: {}", name, e))
        })?;
        Ok(Mailbox::new(path))
    }

    /// Remove `accountRoot/<name>`. Only empty directories can be removed;
    /// anything else propagates as a mailbox error.
    pub async fn delete_mailbox(&self, name: &str) -> Result<()> {
        let path = self.root.join(name);
        tokio::fs::remove_dir(&path)
            .await
            .map_err(|e| Error::MailboxNotFound(format!("{}: {}", name, e)))
    }

    /// Subscription state is not tracked.
    pub fn subscribe(&self, name: &str) {
        debug!(mailbox = %name, "Subscription requested but not tracked");
    }

    /// Subscription state is not tracked; everything reports subscribed.
    pub fn is_subscribed(&self, _name: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_resolve_creates_directory() {
        let root = TempDir::new().unwrap();
        let account = Account::resolve("user@example.com", root.path())
            .await
            .unwrap();

        assert_eq!(account.root(), root.path().join("example.com").join("user"));
        assert!(account.root().is_dir());
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let root = TempDir::new().unwrap();
        let first = Account::resolve("user@example.com", root.path())
            .await
            .unwrap();
        let second = Account::resolve("user@example.com", root.path())
            .await
            .unwrap();

        assert_eq!(first.root(), second.root());
    }

    #[tokio::test]
    async fn test_resolve_rejects_malformed_identities() {
        let root = TempDir::new().unwrap();

        for bad in ["plainuser", "a@b@c", "", "@@"] {
            let err = Account::resolve(bad, root.path()).await.unwrap_err();
            assert!(matches!(err, Error::AddressFormat(_)), "{:?}", bad);
        }
    }

    #[tokio::test]
    async fn test_list_mailboxes_is_inbox_only() {
        let root = TempDir::new().unwrap();
        let account = Account::resolve("user@example.com", root.path())
            .await
            .unwrap();

        // Even a created sub-mailbox stays undiscoverable.
        account.create_mailbox("Archive").await.unwrap();

        let mailboxes = account.list_mailboxes();
        assert_eq!(mailboxes.len(), 1);
        assert_eq!(mailboxes[0].0, "INBOX");
        assert_eq!(mailboxes[0].1.dir(), account.root());
    }

    #[tokio::test]
    async fn test_select_mailbox() {
        let root = TempDir::new().unwrap();
        let account = Account::resolve("user@example.com", root.path())
            .await
            .unwrap();

        assert!(account.select_mailbox("INBOX").is_ok());
        assert!(matches!(
            account.select_mailbox("Archive").unwrap_err(),
            Error::MailboxNotFound(_)
        ));
        // Literal name match only
        assert!(account.select_mailbox("inbox").is_err());
    }

    #[tokio::test]
    async fn test_create_and_delete_mailbox() {
        let root = TempDir::new().unwrap();
        let account = Account::resolve("user@example.com", root.path())
            .await
            .unwrap();

        let mailbox = account.create_mailbox("Archive").await.unwrap();
        assert!(mailbox.dir().is_dir());

        account.delete_mailbox("Archive").await.unwrap();
        assert!(!mailbox.dir().exists());
    }

    #[tokio::test]
    async fn test_delete_nonempty_mailbox_fails() {
        let root = TempDir::new().unwrap();
        let account = Account::resolve("user@example.com", root.path())
            .await
            .unwrap();

        let mailbox = account.create_mailbox("Archive").await.unwrap();
        tokio::fs::write(mailbox.dir().join("kept.eml"), "x")
            .await
            .unwrap();

        assert!(account.delete_mailbox("Archive").await.is_err());
        assert!(mailbox.dir().exists());
    }

    #[tokio::test]
    async fn test_delete_missing_mailbox_fails() {
        let root = TempDir::new().unwrap();
        let account = Account::resolve("user@example.com", root.path())
            .await
            .unwrap();

        assert!(account.delete_mailbox("Nothing").await.is_err());
    }

    #[tokio::test]
    async fn test_subscription_surface() {
        let root = TempDir::new().unwrap();
        let account = Account::resolve("user@example.com", root.path())
            .await
            .unwrap();

        account.subscribe("Whatever");
        assert!(account.is_subscribed("Whatever"));
        assert!(account.is_subscribed("INBOX"));
    }
}
