//! Outbound message composition
//!
//! Renders the body template for one roster entry and builds the full
//! message with the fixed header set (From, To, Subject, Date, MIME-Version
//! and the text content type).

use crate::outbound::roster::RosterEntry;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::Message;
use postbox_common::{Error, Result};

const DEFAULT_SUBJECT: &str = "(no subject)";

/// Substitute the single `{name}` placeholder in the body template.
pub fn render_body(template: &str, name: &str) -> String {
    template.replace("{name}", name)
}

/// Compose the message for one roster entry.
pub fn compose(from: &str, entry: &RosterEntry, template: &str) -> Result<Message> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| Error::AddressFormat(format!("{}: {}", from, e)))?;
    let to: Mailbox = entry
        .mail_to
        .parse()
        .map_err(|e| Error::AddressFormat(format!("{}: {}", entry.mail_to, e)))?;

    let subject = entry.subject.as_deref().unwrap_or(DEFAULT_SUBJECT);
    let body = render_body(template, &entry.name);

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body)
        .map_err(|e| Error::Other(anyhow::anyhow!("Failed to build message: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(subject: Option<&str>) -> RosterEntry {
        RosterEntry {
            mail_to: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            subject: subject.map(String::from),
        }
    }

    #[test]
    fn test_render_body_substitution() {
        assert_eq!(render_body("Hi {name}!", "Alice"), "Hi Alice!");
        assert_eq!(render_body("Hi {name}!", ""), "Hi !");
        assert_eq!(render_body("No placeholder", "Alice"), "No placeholder");
    }

    #[test]
    fn test_compose_headers_and_body() {
        let message = compose(
            "sender@example.org",
            &entry(Some("Greetings")),
            "Dear {name},\r\nwelcome.",
        )
        .unwrap();

        let text = String::from_utf8(message.formatted()).unwrap();
        assert!(text.contains("From: sender@example.org"));
        assert!(text.contains("To: alice@example.com"));
        assert!(text.contains("Subject: Greetings"));
        assert!(text.contains("Date: "));
        assert!(text.contains("Dear Alice,"));
    }

    #[test]
    fn test_compose_default_subject() {
        let message = compose("sender@example.org", &entry(None), "body").unwrap();
        let text = String::from_utf8(message.formatted()).unwrap();
        assert!(text.contains("Subject: (no subject)"));
    }

    #[test]
    fn test_compose_rejects_bad_addresses() {
        assert!(compose("not-an-address", &entry(None), "x").is_err());

        let bad = RosterEntry {
            mail_to: "also not an address".to_string(),
            name: String::new(),
            subject: None,
        };
        assert!(compose("sender@example.org", &bad, "x").is_err());
    }
}
