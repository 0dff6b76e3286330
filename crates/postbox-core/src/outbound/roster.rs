//! Recipient roster loading
//!
//! The roster is a comma-separated file whose first line names the columns.
//! `mail_to` is required; `name` and `subject` are optional.

use postbox_common::{Error, Result};
use std::path::Path;
use tracing::warn;

/// One roster row: a recipient plus optional personalization fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub mail_to: String,
    pub name: String,
    pub subject: Option<String>,
}

/// Load a roster file. Fails if the file is unreadable, has no `mail_to`
/// column, or contains no usable rows.
pub fn load_roster(path: &Path) -> Result<Vec<RosterEntry>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read roster {}: {}", path.display(), e))
    })?;
    parse_roster(&content)
}

fn parse_roster(content: &str) -> Result<Vec<RosterEntry>> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());

    let header = lines
        .next()
        .ok_or_else(|| Error::Config("Roster is empty".to_string()))?;
    let columns: Vec<String> = header.split(',').map(|c| c.trim().to_string()).collect();

    let mail_to_idx = columns
        .iter()
        .position(|c| c == "mail_to")
        .ok_or_else(|| Error::Config("Roster is missing the mail_to column".to_string()))?;
    let name_idx = columns.iter().position(|c| c == "name");
    let subject_idx = columns.iter().position(|c| c == "subject");

    let mut entries = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();

        let mail_to = match fields.get(mail_to_idx) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => {
                warn!(row = %line, "Skipping roster row without a recipient");
                continue;
            }
        };

        let name = name_idx
            .and_then(|i| fields.get(i))
            .map(|v| v.to_string())
            .unwrap_or_default();
        let subject = subject_idx
            .and_then(|i| fields.get(i))
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string());

        entries.push(RosterEntry {
            mail_to,
            name,
            subject,
        });
    }

    if entries.is_empty() {
        return Err(Error::Config("Roster contains no recipients".to_string()));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_roster() {
        let entries = parse_roster(
            "mail_to,name,subject\n\
             a@example.com,Alice,Hello Alice\n\
             b@example.com,Bob,\n",
        )
        .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            RosterEntry {
                mail_to: "a@example.com".to_string(),
                name: "Alice".to_string(),
                subject: Some("Hello Alice".to_string()),
            }
        );
        // Empty subject cell means no subject
        assert_eq!(entries[1].subject, None);
    }

    #[test]
    fn test_parse_minimal_roster() {
        let entries = parse_roster("mail_to\na@example.com\n").unwrap();
        assert_eq!(entries[0].name, "");
        assert_eq!(entries[0].subject, None);
    }

    #[test]
    fn test_rows_without_recipient_skipped() {
        let entries = parse_roster(
            "mail_to,name\n\
             ,NoAddress\n\
             a@example.com,Alice\n",
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_missing_mail_to_column() {
        let err = parse_roster("email,name\na@example.com,Alice\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_empty_roster() {
        assert!(parse_roster("").is_err());
        assert!(parse_roster("mail_to,name\n").is_err());
    }

    #[test]
    fn test_blank_lines_ignored() {
        let entries = parse_roster("mail_to\n\na@example.com\n\n").unwrap();
        assert_eq!(entries.len(), 1);
    }
}
