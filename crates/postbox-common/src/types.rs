//! Common types for postbox

use serde::{Deserialize, Serialize};

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.splitn(2, '@').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            Some(Self::new(parts[0], parts[1]))
        } else {
            None
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::AddressFormat(s.to_string()))
    }
}

/// Message envelope (SMTP level)
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Sender (MAIL FROM); None for the null sender
    pub from: Option<EmailAddress>,

    /// Recipients (RCPT TO)
    pub to: Vec<EmailAddress>,

    /// HELO/EHLO hostname
    pub helo: Option<String>,
}

impl Envelope {
    pub fn reset(&mut self) {
        self.from = None;
        self.to.clear();
    }
}
