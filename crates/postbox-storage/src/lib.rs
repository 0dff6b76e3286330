//! File-backed mail storage for postbox.
//!
//! Storage layout is one directory per account (`<root>/<domain>/<local>/`)
//! holding one regular file per message. This crate owns everything that
//! touches that tree: credential loading, account resolution, mailbox
//! scanning, message access and delivery deposits.

pub mod account;
pub mod credentials;
pub mod deposit;
pub mod mailbox;
pub mod message;

pub use account::Account;
pub use credentials::CredentialStore;
pub use deposit::DepositWriter;
pub use mailbox::{Mailbox, MessageSelector};
pub use message::StoredMessage;
