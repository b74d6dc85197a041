//! Line-delimited JSON decoding for `/api/chat` and `/api/pull` bodies.
//!
//! Bytes arrive in arbitrary chunks; [`LineDecoder`] reassembles complete
//! lines and [`parse_records`] turns them into a lazy sequence of
//! [`ProtocolRecord`]s that ends at the first terminal record or when the
//! connection closes.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::stream::{self, Stream, StreamExt};
use memchr::memchr;
use tracing::{debug, warn};

use crate::api::StreamRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolRecord {
    /// A chat fragment. `done` marks the last record of an exchange.
    Content { content: String, done: bool },
    Progress(PullProgress),
    /// The server reported an error in-band.
    Failure(String),
}

impl ProtocolRecord {
    pub fn is_terminal(&self) -> bool {
        match self {
            ProtocolRecord::Content { done, .. } => *done,
            ProtocolRecord::Progress(progress) => progress.is_success(),
            ProtocolRecord::Failure(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PullProgress {
    pub status: String,
    pub total: Option<u64>,
    pub completed: Option<u64>,
    pub digest: Option<String>,
}

impl PullProgress {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Completed share of the current layer, when the server reports a size.
    pub fn fraction(&self) -> Option<f64> {
        let total = self.total.filter(|total| *total > 0)?;
        let completed = self.completed.unwrap_or(0);
        Some((completed as f64 / total as f64).min(1.0))
    }

    pub fn percentage(&self) -> Option<u8> {
        self.fraction().map(|fraction| (fraction * 100.0).round() as u8)
    }

    pub fn stage_label(&self) -> String {
        let status = self.status.as_str();
        match status {
            "pulling manifest" => "Pulling manifest".to_string(),
            "verifying sha256 digest" => "Verifying download".to_string(),
            "writing manifest" => "Writing manifest".to_string(),
            "removing any unused layers" => "Cleaning up".to_string(),
            "success" => "Complete".to_string(),
            _ if status.starts_with("pulling ") || status.starts_with("downloading") => {
                "Downloading".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Reassembles newline-terminated lines from arbitrary byte chunks.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed, trimmed, with blank
    /// lines removed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();

        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            match std::str::from_utf8(&self.buffer[..newline_pos]) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        lines.push(line.to_string());
                    }
                }
                Err(err) => warn!(error = %err, "invalid UTF-8 in stream, line skipped"),
            }
            self.buffer.drain(..=newline_pos);
        }
        lines
    }

    /// Flush a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        match String::from_utf8(rest) {
            Ok(line) => {
                let line = line.trim();
                (!line.is_empty()).then(|| line.to_string())
            }
            Err(err) => {
                warn!(error = %err, "invalid UTF-8 at end of stream");
                None
            }
        }
    }
}

/// Decode one line. Malformed lines and records with nothing recognizable
/// in them yield `None`.
pub fn decode_record(line: &str) -> Option<ProtocolRecord> {
    let record: StreamRecord = match serde_json::from_str(line) {
        Ok(record) => record,
        Err(err) => {
            debug!(error = %err, "skipping malformed stream record");
            return None;
        }
    };

    if let Some(error) = record.error {
        return Some(ProtocolRecord::Failure(error));
    }
    if let Some(message) = record.message {
        return Some(ProtocolRecord::Content {
            content: message.content,
            done: record.done,
        });
    }
    if let Some(status) = record.status {
        return Some(ProtocolRecord::Progress(PullProgress {
            status,
            total: record.total,
            completed: record.completed,
            digest: record.digest,
        }));
    }
    record.done.then(|| ProtocolRecord::Content {
        content: String::new(),
        done: true,
    })
}

struct ParseState<S> {
    inner: Pin<Box<S>>,
    decoder: LineDecoder,
    ready: VecDeque<String>,
    closed: bool,
    finished: bool,
}

/// Turn a byte stream into protocol records.
///
/// The sequence is forward-only: it ends after the first terminal record,
/// when the inner stream closes, or after yielding the first transport error.
pub fn parse_records<S, B, E>(inner: S) -> impl Stream<Item = Result<ProtocolRecord, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let state = ParseState {
        inner: Box::pin(inner),
        decoder: LineDecoder::new(),
        ready: VecDeque::new(),
        closed: false,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }
            while let Some(line) = state.ready.pop_front() {
                if let Some(record) = decode_record(&line) {
                    state.finished = record.is_terminal();
                    return Some((Ok(record), state));
                }
            }
            if state.closed {
                return None;
            }
            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    let lines = state.decoder.push(chunk.as_ref());
                    state.ready.extend(lines);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.closed = true;
                    state.ready.extend(state.decoder.finish());
                }
            }
        }
    })
}
