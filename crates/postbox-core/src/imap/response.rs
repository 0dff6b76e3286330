//! IMAP response generation
//!
//! Builds the wire text for server replies: tagged status lines, untagged
//! data lines, and literals.

/// IMAP response builder
pub struct ImapResponse;

impl ImapResponse {
    /// Server greeting
    pub fn greeting(hostname: &str) -> String {
        format!(
            "* OK [CAPABILITY IMAP4rev1] {} postbox IMAP server ready\r\n",
            hostname
        )
    }

    /// Tagged OK response
    pub fn ok(tag: &str, message: &str) -> String {
        format!("{} OK {}\r\n", tag, message)
    }

    /// Tagged NO response
    pub fn no(tag: &str, message: &str) -> String {
        format!("{} NO {}\r\n", tag, message)
    }

    /// Tagged BAD response
    pub fn bad(tag: &str, message: &str) -> String {
        format!("{} BAD {}\r\n", tag, message)
    }

    /// Untagged BYE response
    pub fn bye(message: &str) -> String {
        format!("* BYE {}\r\n", message)
    }

    /// CAPABILITY response
    pub fn capability() -> String {
        "* CAPABILITY IMAP4rev1\r\n".to_string()
    }

    /// LIST response for a mailbox
    pub fn list(flags: &[&str], delimiter: &str, mailbox: &str) -> String {
        format!(
            "* LIST ({}) \"{}\" \"{}\"\r\n",
            flags.join(" "),
            delimiter,
            mailbox
        )
    }

    /// LSUB response for a mailbox
    pub fn lsub(flags: &[&str], delimiter: &str, mailbox: &str) -> String {
        format!(
            "* LSUB ({}) \"{}\" \"{}\"\r\n",
            flags.join(" "),
            delimiter,
            mailbox
        )
    }

    /// SELECT response components
    pub fn mailbox_flags(flags: &[&str]) -> String {
        format!("* FLAGS ({})\r\n", flags.join(" "))
    }

    pub fn exists(count: u32) -> String {
        format!("* {} EXISTS\r\n", count)
    }

    pub fn recent(count: u32) -> String {
        format!("* {} RECENT\r\n", count)
    }

    pub fn uid_validity(value: u32) -> String {
        format!("* OK [UIDVALIDITY {}] UIDs valid\r\n", value)
    }

    /// STATUS response
    pub fn status(mailbox: &str, items: &[(String, u32)]) -> String {
        let body = items
            .iter()
            .map(|(name, value)| format!("{} {}", name, value))
            .collect::<Vec<_>>()
            .join(" ");
        format!("* STATUS \"{}\" ({})\r\n", mailbox, body)
    }

    /// FETCH response for one message
    pub fn fetch(seq: u32, items: &[(String, String)]) -> String {
        let body = items
            .iter()
            .map(|(name, value)| format!("{} {}", name, value))
            .collect::<Vec<_>>()
            .join(" ");
        format!("* {} FETCH ({})\r\n", seq, body)
    }

    /// A literal: byte-count prefix then the raw content.
    pub fn literal(content: &[u8]) -> String {
        format!(
            "{{{}}}\r\n{}",
            content.len(),
            String::from_utf8_lossy(content)
        )
    }

    /// Single-part BODYSTRUCTURE for a plain-text, never-multipart message.
    pub fn body_structure(size: u64) -> String {
        format!(
            "(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"UTF-8\") NIL NIL \"7BIT\" {} 0)",
            size
        )
    }
}
