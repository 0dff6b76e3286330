//! IMAP access: command parsing, response building, session state, server.

pub mod command;
pub mod response;
pub mod server;
pub mod session;

pub use command::{FetchItem, ImapCommand, TaggedCommand};
pub use response::ImapResponse;
pub use server::{ImapServer, ImapServerConfig};
pub use session::{ImapSession, SessionState};
