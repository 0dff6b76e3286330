//! postbox core — SMTP reception, IMAP access and outbound batch sending.
//!
//! The inbound path accepts SMTP deliveries and persists them through the
//! storage layer; the read path serves those files back over an IMAP subset;
//! the outbound path fans a composed message out to a roster of recipients
//! and tracks aggregate completion.

pub mod imap;
pub mod outbound;
pub mod smtp;

pub use imap::{ImapServer, ImapServerConfig};
pub use outbound::{BatchJob, BatchReport, BatchSender};
pub use smtp::{DeliveryRouter, MessageSink, SmtpServer, SmtpServerConfig};
