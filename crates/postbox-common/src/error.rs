//! Error types for postbox

use thiserror::Error;

/// Main error type for postbox
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Deliberately carries no detail: unknown user and wrong password are
    /// indistinguishable to the caller.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid address format: {0}")]
    AddressFormat(String),

    #[error("Mailbox not found: {0}")]
    MailboxNotFound(String),

    #[error("Recipient refused: {0}")]
    RecipientRefused(String),

    #[error("Unrecognized message selector: {0}")]
    Selector(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for postbox
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The SMTP reply code a delivery-path error maps to.
    pub fn smtp_code(&self) -> u16 {
        match self {
            Error::RecipientRefused(_) => 550,
            Error::Unauthorized => 535,
            Error::AddressFormat(_) => 501,
            _ => 451,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtp_codes() {
        assert_eq!(Error::RecipientRefused("x".into()).smtp_code(), 550);
        assert_eq!(Error::Unauthorized.smtp_code(), 535);
        assert_eq!(Error::Storage("disk".into()).smtp_code(), 451);
    }
}
