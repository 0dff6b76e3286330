//! Credential store
//!
//! Loads username/password pairs from a flat comma-separated file once at
//! startup and answers authentication queries for the process lifetime.

use postbox_common::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// In-memory credential store.
///
/// Passwords are stored and compared in plaintext; this service is scoped to
/// closed test deployments and deliberately performs no hashing.
#[derive(Debug)]
pub struct CredentialStore {
    creds: HashMap<String, String>,
}

/// Strip surrounding whitespace, then any enclosing quote characters.
///
/// Applied to both stored and supplied values so that a quoted field in the
/// source file matches an unquoted login and vice versa.
fn scrub(s: &str) -> &str {
    s.trim().trim_matches('"')
}

impl CredentialStore {
    /// Load credentials from a file of `username,password[,...]` rows.
    ///
    /// An unreadable source is fatal. Rows with fewer than two fields or a
    /// username without `@` are skipped silently; the last occurrence of a
    /// duplicated username wins.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;

        let store = Self::from_rows(&content);
        info!(
            path = %path.display(),
            entries = store.creds.len(),
            "Loaded credential store"
        );
        Ok(store)
    }

    fn from_rows(content: &str) -> Self {
        let mut creds = HashMap::new();

        for line in content.lines() {
            let mut fields = line.splitn(3, ',');
            let (user, pass) = match (fields.next(), fields.next()) {
                (Some(u), Some(p)) => (scrub(u), scrub(p)),
                _ => continue,
            };
            if !user.contains('@') {
                continue;
            }
            creds.insert(user.to_string(), pass.to_string());
        }

        Self { creds }
    }

    /// Number of loaded credential records.
    pub fn len(&self) -> usize {
        self.creds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creds.is_empty()
    }

    /// Check a username/password pair.
    ///
    /// Returns the canonical (scrubbed) identity on success. Unknown users
    /// and wrong passwords both map to the same generic `Unauthorized` error
    /// so that login attempts cannot enumerate accounts.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<String> {
        let user = scrub(username);
        let pass = scrub(password);

        match self.creds.get(user) {
            Some(stored) if stored == pass => Ok(user.to_string()),
            _ => {
                // Logging the attempted pair is intentional legacy behavior;
                // keep this at debug and treat the log stream as sensitive.
                debug!(username = %user, password = %pass, "Login attempt rejected");
                Err(Error::Unauthorized)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn store(rows: &str) -> CredentialStore {
        CredentialStore::from_rows(rows)
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "alice@example.com,secret").unwrap();
        writeln!(file, "bob@example.com,hunter2,ignored,extra").unwrap();

        let store = CredentialStore::load(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.authenticate("bob@example.com", "hunter2").is_ok());
    }

    #[test]
    fn test_load_missing_file_is_fatal() {
        let err = CredentialStore::load(Path::new("/nonexistent/creds.csv")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_rows_skipped() {
        let store = store("no-at-sign,pw\nonly-one-field\nalice@example.com,pw\n\n");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_username_last_wins() {
        let store = store("a@b.c,first\na@b.c,second");
        assert!(store.authenticate("a@b.c", "second").is_ok());
        assert!(store.authenticate("a@b.c", "first").is_err());
    }

    #[test]
    fn test_scrubs_quotes_and_whitespace() {
        let store = store("alice@example.com,\"secret\"");

        assert_eq!(
            store.authenticate("alice@example.com", "secret").unwrap(),
            "alice@example.com"
        );
        assert!(store.authenticate("  alice@example.com  ", " \"secret\" ").is_ok());
        assert!(store.authenticate("\"alice@example.com\"", "secret").is_ok());
    }

    #[test]
    fn test_rejections_are_generic() {
        let store = store("alice@example.com,secret");

        let unknown = store.authenticate("mallory@example.com", "secret").unwrap_err();
        let wrong = store.authenticate("alice@example.com", "wrong").unwrap_err();
        assert!(matches!(unknown, Error::Unauthorized));
        assert!(matches!(wrong, Error::Unauthorized));
    }

    #[test]
    fn test_password_is_case_sensitive() {
        let store = store("alice@example.com,Secret");
        assert!(store.authenticate("alice@example.com", "secret").is_err());
    }

    #[test]
    fn test_empty_password_field_allowed() {
        let store = store("alice@example.com,");
        assert!(store.authenticate("alice@example.com", "").is_ok());
    }
}
