//! postbox-send - batch mail client entry point
//!
//! Composes one message per roster entry from a body template and sends them
//! all against one SMTP endpoint, then reports the aggregate outcome.

use anyhow::{bail, Context, Result};
use postbox_core::outbound::{compose, load_roster, BatchJob, BatchSender};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 4 || args.len() > 5 {
        bail!("usage: postbox-send <host> <roster.csv> <template.txt> <from-address> [port]");
    }

    let host = args[0].clone();
    let roster_path = Path::new(&args[1]);
    let template_path = Path::new(&args[2]);
    let from = &args[3];
    let port: u16 = match args.get(4) {
        Some(p) => p.parse().context("Invalid port")?,
        None => default_port(&host),
    };

    let entries = load_roster(roster_path)?;
    let template = std::fs::read_to_string(template_path).with_context(|| {
        format!("Failed to read template {}", template_path.display())
    })?;

    let mut jobs = Vec::new();
    for entry in entries {
        match compose(from, &entry, &template) {
            Ok(message) => jobs.push(BatchJob {
                recipient: entry.mail_to.clone(),
                message,
            }),
            Err(e) => {
                warn!(recipient = %entry.mail_to, error = %e, "Skipping row: could not compose message");
            }
        }
    }

    if jobs.is_empty() {
        bail!("No sendable roster entries");
    }

    info!(host = %host, port = port, attempts = jobs.len(), "Starting batch send");
    let report = BatchSender::new(host, port).run(jobs).await;

    for outcome in report.outcomes.iter().filter(|o| !o.is_success()) {
        warn!(
            recipient = %outcome.recipient,
            error = outcome.error.as_deref().unwrap_or("unknown"),
            "Delivery failed"
        );
    }
    info!(
        sent = report.sent_count(),
        failed = report.failed_count(),
        "All sends completed"
    );

    if report.failed_count() > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Companion-server convention: the unprivileged test port locally, the
/// standard MTA port everywhere else.
fn default_port(host: &str) -> u16 {
    match host.to_ascii_lowercase().as_str() {
        "localhost" | "127.0.0.1" => 2500,
        _ => 25,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
