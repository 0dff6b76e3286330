//! Stored message access
//!
//! A [`StoredMessage`] is a view over one file produced by a mailbox scan.
//! Instances are transient: every rescan builds fresh ones, and the one-shot
//! body-read state below belongs to the instance, not to the file.

use mail_parser::MessageParser;
use postbox_common::{Error, Result};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// One persisted message, identified by its UID within the current scan and
/// the file backing it.
#[derive(Debug)]
pub struct StoredMessage {
    uid: u32,
    path: PathBuf,
    consumed: AtomicBool,
}

impl StoredMessage {
    pub fn new(uid: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            uid,
            path: path.into(),
            consumed: AtomicBool::new(false),
        }
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Message flags. Flags are not modeled; always empty.
    pub fn flags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Multipart structure is not modeled; always false.
    pub fn is_multipart(&self) -> bool {
        false
    }

    /// Byte length of the backing file, or 0 if it cannot be read.
    pub async fn size(&self) -> u64 {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        }
    }

    /// Parse the leading header block (up to the first blank line) into a
    /// key/value map. Duplicate header names keep the last value seen.
    ///
    /// Never fails: any read or parse problem yields an empty map so the
    /// protocol layer can still form a response.
    pub async fn headers(&self) -> HashMap<String, String> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(d) => d,
            Err(_) => return HashMap::new(),
        };

        let block = header_block(&data);
        let parsed = match MessageParser::default().parse(block) {
            Some(m) => m,
            None => return HashMap::new(),
        };

        let mut headers = HashMap::new();
        for header in parsed.headers() {
            // Structured values (addresses, dates) have no as_text form;
            // fall back to the raw field bytes for those.
            let value = match header.value().as_text() {
                Some(text) => text.to_string(),
                None => {
                    let raw = &block[header.offset_start..header.offset_end];
                    String::from_utf8_lossy(raw)
                        .split_whitespace()
                        .collect::<Vec<_>>()
                        .join(" ")
                }
            };
            headers.insert(header.name().to_string(), value);
        }
        headers
    }

    /// Read the full message body.
    ///
    /// The first successful read consumes the message: later calls on the
    /// same instance return an empty buffer instead of re-reading the file.
    /// A failed read propagates the error and does not consume.
    pub async fn body(&self) -> Result<Vec<u8>> {
        if self.consumed.load(Ordering::Acquire) {
            return Ok(Vec::new());
        }

        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to read {}: {}", self.path.display(), e)))?;

        self.consumed.store(true, Ordering::Release);
        Ok(data)
    }

    /// Same one-shot semantics as [`body`](Self::body), returning a readable
    /// stream handle instead of a raw buffer.
    pub async fn body_stream(&self) -> Result<Cursor<Vec<u8>>> {
        Ok(Cursor::new(self.body().await?))
    }
}

/// Slice the header block: everything before the first line that is empty
/// after whitespace trimming.
fn header_block(data: &[u8]) -> &[u8] {
    let mut offset = 0;
    for line in data.split_inclusive(|&b| b == b'\n') {
        let text: &[u8] = match line.strip_suffix(b"\r\n") {
            Some(t) => t,
            None => line.strip_suffix(b"\n").unwrap_or(line),
        };
        if text.iter().all(|b| b.is_ascii_whitespace()) {
            return &data[..offset];
        }
        offset += line.len();
    }
    data
}
