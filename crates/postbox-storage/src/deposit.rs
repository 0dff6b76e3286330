//! Delivery deposit writer
//!
//! Persists one accepted inbound message as one freshly named file under
//! `<root>/<domain>/<local>/`.

use postbox_common::{Error, Result};
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

/// Reject address components that could escape the storage tree when joined
/// into a path.
pub fn is_safe_component(s: &str) -> bool {
    !s.is_empty() && !s.contains('/') && !s.contains('\\') && !s.contains("..")
}

/// Writer for the per-recipient message tree.
#[derive(Debug, Clone)]
pub struct DepositWriter {
    root: PathBuf,
}

impl DepositWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write `text` as a new message file for `local@domain`, creating the
    /// recipient directory if needed. Returns the path written.
    ///
    /// Filenames embed a UUIDv7, whose millisecond-timestamp prefix keeps
    /// directory order chronological while the random tail keeps rapid
    /// concurrent deliveries collision-free.
    pub async fn deposit(&self, domain: &str, local: &str, text: &str) -> Result<PathBuf> {
        if !is_safe_component(domain) || !is_safe_component(local) {
            return Err(Error::Storage(format!(
                "Unsafe recipient path component: {}@{}",
                local, domain
            )));
        }

        let dir = self.root.join(domain).join(local);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::Storage(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let path = dir.join(format!("message_{}.eml", Uuid::now_v7()));
        tokio::fs::write(&path, text).await.map_err(|e| {
            Error::Storage(format!("Failed to write {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), bytes = text.len(), "Stored message");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_deposit_writes_one_file() {
        let root = TempDir::new().unwrap();
        let writer = DepositWriter::new(root.path());

        let path = writer
            .deposit("example.com", "user", "Subject: Hi\n\nBody line")
            .await
            .unwrap();

        assert!(path.starts_with(root.path().join("example.com").join("user")));
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "Subject: Hi\n\nBody line");
    }

    #[tokio::test]
    async fn test_deposit_filenames_are_unique_and_ordered() {
        let root = TempDir::new().unwrap();
        let writer = DepositWriter::new(root.path());

        let first = writer.deposit("example.com", "user", "one").await.unwrap();
        // UUIDv7 ordering is only guaranteed across millisecond ticks.
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = writer.deposit("example.com", "user", "two").await.unwrap();

        assert_ne!(first, second);
        // UUIDv7 names sort by creation time, so the scan order of the
        // mailbox matches arrival order.
        assert!(first.file_name().unwrap() < second.file_name().unwrap());
    }

    #[tokio::test]
    async fn test_deposit_rejects_traversal_components() {
        let root = TempDir::new().unwrap();
        let writer = DepositWriter::new(root.path());

        assert!(writer.deposit("..", "user", "x").await.is_err());
        assert!(writer.deposit("example.com", "../user", "x").await.is_err());
        assert!(writer.deposit("example.com", "", "x").await.is_err());
        assert!(writer.deposit("exa/mple.com", "user", "x").await.is_err());
    }

    #[test]
    fn test_safe_component() {
        assert!(is_safe_component("example.com"));
        assert!(is_safe_component("user.name"));
        assert!(!is_safe_component(".."));
        assert!(!is_safe_component("a/b"));
        assert!(!is_safe_component("a\\b"));
        assert!(!is_safe_component(""));
    }
}
