//! IMAP command parsing
//!
//! Parses the tagged-command subset this server answers. Argument tokens may
//! be atoms or quoted strings; fetch item lists may be parenthesized.

/// A client command with its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedCommand {
    pub tag: String,
    pub command: ImapCommand,
}

/// The commands this server understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImapCommand {
    Capability,
    Noop,
    Logout,
    Login { username: String, password: String },
    List { reference: String, pattern: String },
    Lsub { reference: String, pattern: String },
    Select { mailbox: String },
    Status { mailbox: String, items: Vec<String> },
    Create { mailbox: String },
    Delete { mailbox: String },
    Subscribe { mailbox: String },
    Unsubscribe { mailbox: String },
    Fetch { sequence: String, items: Vec<FetchItem>, uid: bool },
    Expunge,
    Close,
    Unknown { command: String },
}

/// FETCH data items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchItem {
    Uid,
    Flags,
    Rfc822Size,
    /// Full message text (`RFC822`)
    Rfc822,
    /// Full message text (`BODY[]`)
    Body,
    /// Full message text without flag side effects (`BODY.PEEK[]`)
    BodyPeek,
    /// Header block only (`BODY[HEADER]` / `BODY.PEEK[HEADER]`)
    BodyHeader,
    BodyStructure,
}

impl FetchItem {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "UID" => Some(FetchItem::Uid),
            "FLAGS" => Some(FetchItem::Flags),
            "RFC822.SIZE" => Some(FetchItem::Rfc822Size),
            "RFC822" => Some(FetchItem::Rfc822),
            "BODY[]" => Some(FetchItem::Body),
            "BODY.PEEK[]" => Some(FetchItem::BodyPeek),
            "BODY[HEADER]" | "BODY.PEEK[HEADER]" => Some(FetchItem::BodyHeader),
            "BODYSTRUCTURE" => Some(FetchItem::BodyStructure),
            _ => None,
        }
    }
}

/// Parse one command line. `None` means the line was malformed (missing tag,
/// missing required arguments, or an unparseable fetch item list).
pub fn parse(line: &str) -> Option<TaggedCommand> {
    let tokens = tokenize(line);
    if tokens.len() < 2 {
        return None;
    }

    let tag = tokens[0].clone();
    let mut name = tokens[1].to_uppercase();
    let mut args: &[String] = &tokens[2..];

    let mut uid = false;
    if name == "UID" {
        let next = args.first()?;
        uid = true;
        name = next.to_uppercase();
        args = &args[1..];
    }

    let command = match name.as_str() {
        "CAPABILITY" => ImapCommand::Capability,
        "NOOP" => ImapCommand::Noop,
        "LOGOUT" => ImapCommand::Logout,
        "CLOSE" => ImapCommand::Close,
        "EXPUNGE" => ImapCommand::Expunge,

        "LOGIN" => ImapCommand::Login {
            username: args.first()?.clone(),
            password: args.get(1)?.clone(),
        },

        "LIST" => ImapCommand::List {
            reference: args.first()?.clone(),
            pattern: args.get(1)?.clone(),
        },
        "LSUB" => ImapCommand::Lsub {
            reference: args.first()?.clone(),
            pattern: args.get(1)?.clone(),
        },

        "SELECT" | "EXAMINE" => ImapCommand::Select {
            mailbox: args.first()?.clone(),
        },
        "CREATE" => ImapCommand::Create {
            mailbox: args.first()?.clone(),
        },
        "DELETE" => ImapCommand::Delete {
            mailbox: args.first()?.clone(),
        },
        "SUBSCRIBE" => ImapCommand::Subscribe {
            mailbox: args.first()?.clone(),
        },
        "UNSUBSCRIBE" => ImapCommand::Unsubscribe {
            mailbox: args.first()?.clone(),
        },

        "STATUS" => ImapCommand::Status {
            mailbox: args.first()?.clone(),
            items: args[1..]
                .iter()
                .map(|t| t.trim_matches(|c| c == '(' || c == ')').to_uppercase())
                .filter(|t| !t.is_empty())
                .collect(),
        },

        "FETCH" => {
            let sequence = args.first()?.clone();
            let mut items = Vec::new();
            for token in &args[1..] {
                let token = token.trim_matches(|c| c == '(' || c == ')');
                if token.is_empty() {
                    continue;
                }
                items.push(FetchItem::parse(token)?);
            }
            if items.is_empty() {
                return None;
            }
            ImapCommand::Fetch {
                sequence,
                items,
                uid,
            }
        }

        other => ImapCommand::Unknown {
            command: other.to_string(),
        },
    };

    Some(TaggedCommand { tag, command })
}

/// Split a command line into atoms and quoted strings.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.trim().chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            let mut token = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            token.push(escaped);
                        }
                    }
                    _ => token.push(c),
                }
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push(token);
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(
            parse("a1 CAPABILITY").unwrap(),
            TaggedCommand {
                tag: "a1".to_string(),
                command: ImapCommand::Capability
            }
        );
        assert_eq!(
            parse("a2 noop").unwrap().command,
            ImapCommand::Noop
        );
        assert_eq!(parse("a3 LOGOUT").unwrap().command, ImapCommand::Logout);
    }

    #[test]
    fn test_parse_login_with_quoted_arguments() {
        let cmd = parse("a1 LOGIN \"user@example.com\" \"my pass\"").unwrap();
        assert_eq!(
            cmd.command,
            ImapCommand::Login {
                username: "user@example.com".to_string(),
                password: "my pass".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_login_missing_password() {
        assert!(parse("a1 LOGIN user@example.com").is_none());
    }

    #[test]
    fn test_parse_select() {
        let cmd = parse("a2 SELECT INBOX").unwrap();
        assert_eq!(
            cmd.command,
            ImapCommand::Select {
                mailbox: "INBOX".to_string()
            }
        );
    }

    #[test]
    fn test_parse_uid_fetch() {
        let cmd = parse("a3 UID FETCH 2 (FLAGS RFC822.SIZE BODY[])").unwrap();
        assert_eq!(
            cmd.command,
            ImapCommand::Fetch {
                sequence: "2".to_string(),
                items: vec![FetchItem::Flags, FetchItem::Rfc822Size, FetchItem::Body],
                uid: true,
            }
        );
    }

    #[test]
    fn test_parse_fetch_single_item() {
        let cmd = parse("a4 FETCH 1:3 BODY[HEADER]").unwrap();
        assert_eq!(
            cmd.command,
            ImapCommand::Fetch {
                sequence: "1:3".to_string(),
                items: vec![FetchItem::BodyHeader],
                uid: false,
            }
        );
    }

    #[test]
    fn test_parse_fetch_unknown_item_fails() {
        assert!(parse("a5 FETCH 1 (FLAGS SHINY)").is_none());
        assert!(parse("a5 FETCH 1").is_none());
    }

    #[test]
    fn test_parse_status() {
        let cmd = parse("a6 STATUS INBOX (MESSAGES UNSEEN)").unwrap();
        assert_eq!(
            cmd.command,
            ImapCommand::Status {
                mailbox: "INBOX".to_string(),
                items: vec!["MESSAGES".to_string(), "UNSEEN".to_string()],
            }
        );
    }

    #[test]
    fn test_parse_unknown_command() {
        let cmd = parse("a7 XFROBNICATE now").unwrap();
        assert_eq!(
            cmd.command,
            ImapCommand::Unknown {
                command: "XFROBNICATE".to_string()
            }
        );
    }

    #[test]
    fn test_parse_bare_line() {
        assert!(parse("").is_none());
        assert!(parse("onlytag").is_none());
    }

    #[test]
    fn test_tokenize_escapes() {
        assert_eq!(
            tokenize(r#"a1 LOGIN "qu\"oted" plain"#),
            vec!["a1", "LOGIN", "qu\"oted", "plain"]
        );
    }
}
