//! Batch send orchestration
//!
//! Sends one composed message per roster entry against a single SMTP
//! endpoint. Every attempt is independent: a refused connection or rejected
//! recipient is recorded and never halts the others, and the job completes
//! only when every attempt has resolved. There is no retry.

use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Job lifecycle. A job is constructed `Pending`, moves to `Sending` when
/// the first attempt is dispatched and to `Completed` once every attempt has
/// resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Sending,
    Completed,
}

/// One send attempt: a recipient and its fully composed message.
#[derive(Debug)]
pub struct BatchJob {
    pub recipient: String,
    pub message: Message,
}

/// The resolution of one attempt.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub recipient: String,
    /// `None` on success, the transport error otherwise.
    pub error: Option<String>,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate result of one batch job.
#[derive(Debug)]
pub struct BatchReport {
    pub state: JobState,
    pub outcomes: Vec<AttemptOutcome>,
}

impl BatchReport {
    pub fn sent_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.sent_count()
    }
}

/// Batch sender bound to one SMTP endpoint.
pub struct BatchSender {
    host: String,
    port: u16,
    concurrency: usize,
    timeout_secs: u64,
}

impl BatchSender {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            concurrency: 10,
            timeout_secs: 30,
        }
    }

    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Run the whole batch to completion and report every outcome.
    pub async fn run(&self, jobs: Vec<BatchJob>) -> BatchReport {
        let mut state = JobState::Pending;
        debug!(
            ?state,
            host = %self.host,
            port = self.port,
            attempts = jobs.len(),
            "Batch job created"
        );

        // Plaintext transport: this client talks to the companion server,
        // which does not offer TLS.
        let mailer: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
                .port(self.port)
                .timeout(Some(Duration::from_secs(self.timeout_secs)))
                .build();

        state = JobState::Sending;
        debug!(?state, "Dispatching attempts");
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::new();

        for job in jobs {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let mailer = mailer.clone();
            let recipient = job.recipient.clone();

            let handle = tokio::spawn(async move {
                let result = mailer.send(job.message).await;
                drop(permit);

                match result {
                    Ok(_) => {
                        debug!(recipient = %job.recipient, "Attempt succeeded");
                        AttemptOutcome {
                            recipient: job.recipient,
                            error: None,
                        }
                    }
                    Err(e) => {
                        warn!(recipient = %job.recipient, error = %e, "Attempt failed");
                        AttemptOutcome {
                            recipient: job.recipient,
                            error: Some(e.to_string()),
                        }
                    }
                }
            });

            handles.push((recipient, handle));
        }

        // The aggregate resolves only when every attempt has.
        let mut outcomes = Vec::new();
        for (recipient, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(recipient = %recipient, "Send task failed: {}", e);
                    outcomes.push(AttemptOutcome {
                        recipient,
                        error: Some(format!("send task failed: {}", e)),
                    });
                }
            }
        }

        state = JobState::Completed;
        info!(
            ?state,
            sent = outcomes.iter().filter(|o| o.is_success()).count(),
            failed = outcomes.iter().filter(|o| !o.is_success()).count(),
            "Batch job completed"
        );

        BatchReport { state, outcomes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::compose::compose;
    use crate::outbound::roster::RosterEntry;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn job(recipient: &str) -> BatchJob {
        let entry = RosterEntry {
            mail_to: recipient.to_string(),
            name: "Tester".to_string(),
            subject: Some("Batch test".to_string()),
        };
        BatchJob {
            recipient: recipient.to_string(),
            message: compose("sender@example.org", &entry, "Hi {name}").unwrap(),
        }
    }

    /// Minimal scripted SMTP endpoint: accepts everything except recipients
    /// whose local part is `reject`.
    async fn fake_smtp_server(listener: TcpListener) {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };

            tokio::spawn(async move {
                let (reader, mut writer) = stream.into_split();
                let mut reader = BufReader::new(reader);
                if writer.write_all(b"220 fake ESMTP\r\n").await.is_err() {
                    return;
                }

                let mut line = String::new();
                let mut in_data = false;
                loop {
                    line.clear();
                    if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                        return;
                    }

                    if in_data {
                        if line.trim() == "." {
                            in_data = false;
                            let _ = writer.write_all(b"250 OK queued\r\n").await;
                        }
                        continue;
                    }

                    let upper = line.trim().to_uppercase();
                    if upper.starts_with("EHLO") || upper.starts_with("HELO") {
                        let _ = writer.write_all(b"250 fake greets you\r\n").await;
                    } else if upper.starts_with("RCPT") && upper.contains("REJECT@") {
                        let _ = writer.write_all(b"550 5.1.1 user unknown\r\n").await;
                    } else if upper.starts_with("DATA") {
                        in_data = true;
                        let _ = writer.write_all(b"354 go ahead\r\n").await;
                    } else if upper.starts_with("QUIT") {
                        let _ = writer.write_all(b"221 bye\r\n").await;
                        return;
                    } else {
                        let _ = writer.write_all(b"250 OK\r\n").await;
                    }
                }
            });
        }
    }

    #[tokio::test]
    async fn test_all_attempts_fail_still_completes() {
        // Nothing listens on port 1; every connection attempt is refused.
        let sender = BatchSender::new("127.0.0.1", 1).with_timeout_secs(5);
        let report = sender.run(vec![job("a@example.com"), job("b@example.com")]).await;

        assert_eq!(report.state, JobState::Completed);
        assert_eq!(report.sent_count(), 0);
        assert_eq!(report.failed_count(), 2);
        assert!(report.outcomes.iter().all(|o| o.error.is_some()));
    }

    #[tokio::test]
    async fn test_mixed_outcomes_complete_without_hanging() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(fake_smtp_server(listener));

        let sender = BatchSender::new("127.0.0.1", port).with_timeout_secs(5);
        let report = sender
            .run(vec![
                job("ok-one@example.com"),
                job("reject@example.com"),
                job("ok-two@example.com"),
            ])
            .await;

        assert_eq!(report.state, JobState::Completed);
        assert_eq!(report.sent_count(), 2);
        assert_eq!(report.failed_count(), 1);

        let failed: Vec<&str> = report
            .outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.recipient.as_str())
            .collect();
        assert_eq!(failed, vec!["reject@example.com"]);
    }

    #[tokio::test]
    async fn test_empty_batch_completes_immediately() {
        let sender = BatchSender::new("127.0.0.1", 1);
        let report = sender.run(Vec::new()).await;
        assert_eq!(report.state, JobState::Completed);
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_cap_is_respected_under_load() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(fake_smtp_server(listener));

        let jobs: Vec<BatchJob> = (0..8)
            .map(|i| job(&format!("user{}@example.com", i)))
            .collect();
        let sender = BatchSender::new("127.0.0.1", port)
            .with_concurrency(2)
            .with_timeout_secs(5);

        let report = sender.run(jobs).await;
        assert_eq!(report.sent_count(), 8);
    }
}
