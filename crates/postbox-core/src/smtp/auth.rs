//! SMTP AUTH mechanisms
//!
//! Decodes AUTH PLAIN and AUTH LOGIN payloads and checks them against the
//! credential store. Both mechanisms carry plaintext credentials; they gate
//! submission only when `auth_required` is set.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use postbox_storage::CredentialStore;
use tracing::{debug, warn};

/// Outcome of an authentication exchange.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// Authenticated as the contained identity.
    Accepted(String),
    /// Credentials rejected (generic).
    Rejected,
    /// The payload could not be decoded.
    Malformed,
}

/// Authenticate an AUTH PLAIN payload.
///
/// PLAIN format per RFC 4616: base64 of `[authzid]\0authcid\0password`.
pub fn authenticate_plain(store: &CredentialStore, payload: &str) -> AuthOutcome {
    let decoded = match BASE64.decode(payload.trim()) {
        Ok(d) => d,
        Err(e) => {
            warn!("AUTH PLAIN: invalid base64: {}", e);
            return AuthOutcome::Malformed;
        }
    };

    let parts: Vec<&[u8]> = decoded.split(|&b| b == 0).collect();
    let (username, password) = match parts.len() {
        2 => (
            String::from_utf8_lossy(parts[0]).to_string(),
            String::from_utf8_lossy(parts[1]).to_string(),
        ),
        3 => (
            String::from_utf8_lossy(parts[1]).to_string(),
            String::from_utf8_lossy(parts[2]).to_string(),
        ),
        _ => {
            warn!("AUTH PLAIN: invalid credential format ({} parts)", parts.len());
            return AuthOutcome::Malformed;
        }
    };

    verify(store, &username, &password)
}

/// Authenticate an AUTH LOGIN exchange after both challenge responses have
/// been collected. Both values are base64 per RFC 4616 practice.
pub fn authenticate_login(store: &CredentialStore, username: &str, password: &str) -> AuthOutcome {
    let username = match BASE64.decode(username.trim()) {
        Ok(d) => String::from_utf8_lossy(&d).to_string(),
        Err(e) => {
            warn!("AUTH LOGIN: invalid base64 username: {}", e);
            return AuthOutcome::Malformed;
        }
    };
    let password = match BASE64.decode(password.trim()) {
        Ok(d) => String::from_utf8_lossy(&d).to_string(),
        Err(e) => {
            warn!("AUTH LOGIN: invalid base64 password: {}", e);
            return AuthOutcome::Malformed;
        }
    };

    verify(store, &username, &password)
}

fn verify(store: &CredentialStore, username: &str, password: &str) -> AuthOutcome {
    match store.authenticate(username, password) {
        Ok(identity) => {
            debug!(identity = %identity, "SMTP authentication successful");
            AuthOutcome::Accepted(identity)
        }
        Err(_) => AuthOutcome::Rejected,
    }
}

/// Base64 `Username:` challenge for AUTH LOGIN.
pub fn login_challenge_username() -> &'static str {
    "VXNlcm5hbWU6"
}

/// Base64 `Password:` challenge for AUTH LOGIN.
pub fn login_challenge_password() -> &'static str {
    "UGFzc3dvcmQ6"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn store() -> CredentialStore {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "user@example.com,testpass").unwrap();
        CredentialStore::load(file.path()).unwrap()
    }

    #[test]
    fn test_plain_with_authzid() {
        let payload = BASE64.encode(b"\0user@example.com\0testpass");
        assert!(matches!(
            authenticate_plain(&store(), &payload),
            AuthOutcome::Accepted(id) if id == "user@example.com"
        ));
    }

    #[test]
    fn test_plain_without_authzid() {
        let payload = BASE64.encode(b"user@example.com\0testpass");
        assert!(matches!(
            authenticate_plain(&store(), &payload),
            AuthOutcome::Accepted(_)
        ));
    }

    #[test]
    fn test_plain_wrong_password() {
        let payload = BASE64.encode(b"\0user@example.com\0wrong");
        assert!(matches!(
            authenticate_plain(&store(), &payload),
            AuthOutcome::Rejected
        ));
    }

    #[test]
    fn test_plain_malformed() {
        assert!(matches!(
            authenticate_plain(&store(), "!!not-base64!!"),
            AuthOutcome::Malformed
        ));
        let no_separators = BASE64.encode(b"justonefield");
        assert!(matches!(
            authenticate_plain(&store(), &no_separators),
            AuthOutcome::Malformed
        ));
    }

    #[test]
    fn test_login_flow() {
        let user = BASE64.encode(b"user@example.com");
        let pass = BASE64.encode(b"testpass");
        assert!(matches!(
            authenticate_login(&store(), &user, &pass),
            AuthOutcome::Accepted(_)
        ));

        let bad = BASE64.encode(b"nope");
        assert!(matches!(
            authenticate_login(&store(), &user, &bad),
            AuthOutcome::Rejected
        ));
    }

    #[test]
    fn test_login_challenges() {
        assert_eq!(login_challenge_username(), BASE64.encode(b"Username:"));
        assert_eq!(login_challenge_password(), BASE64.encode(b"Password:"));
    }
}
