//! SMTP reception: server loop, session handler, AUTH, delivery routing.

pub mod auth;
pub mod delivery;
pub mod handler;
pub mod server;

pub use delivery::{DeliveryRouter, MessageSink, SinkFactory};
pub use handler::SmtpHandler;
pub use server::{SmtpServer, SmtpServerConfig};
