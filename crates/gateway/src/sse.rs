//! Incremental reader for streamed chat completions.
//!
//! The body is newline-delimited text. Lines of the form `data: {json}` carry a
//! completion chunk whose `choices[0].delta.content` is appended to the running
//! text; `data: [DONE]` ends the stream. Comment lines (`:` prefix), blank lines
//! and any other field are skipped.
//!
//! A `data:` line whose JSON does not parse is pushed back to the front of the
//! buffer and retried after the next read.

use futures::{Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More input expected
    Pending,
    /// `[DONE]` seen, stop reading
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    /// Trailing bytes of a UTF-8 sequence split across reads
    carry: Vec<u8>,
    text: String,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text accumulated so far
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consume one read of the body.
    ///
    /// `on_update` is called with the whole accumulated text every time a
    /// fragment is appended.
    pub fn feed(&mut self, chunk: &[u8], mut on_update: impl FnMut(&str)) -> Progress {
        if self.done {
            return Progress::Done;
        }

        self.decode(chunk);

        while let Some(newline) = self.buffer.find('\n') {
            let mut line: String = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }

            if line.starts_with(':') || line.trim().is_empty() {
                continue;
            }

            let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
                continue;
            };
            let payload = payload.trim();

            if payload == DONE_SENTINEL {
                self.done = true;
                return Progress::Done;
            }

            match serde_json::from_str::<Value>(payload) {
                Ok(chunk) => {
                    if let Some(fragment) = delta_content(&chunk) {
                        self.text.push_str(fragment);
                        on_update(&self.text);
                    }
                }
                Err(_) => {
                    self.buffer.insert_str(0, &format!("{line}\n"));
                    break;
                }
            }
        }

        Progress::Pending
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.carry.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&self.carry) {
                Ok(valid) => {
                    self.buffer.push_str(valid);
                    self.carry.clear();
                    return;
                }
                Err(err) => {
                    let (valid, rest) = self.carry.split_at(err.valid_up_to());
                    self.buffer
                        .push_str(std::str::from_utf8(valid).unwrap_or_default());

                    match err.error_len() {
                        // Incomplete sequence at the end, wait for the next read.
                        None => {
                            self.carry = rest.to_vec();
                            return;
                        }
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.carry = rest[len..].to_vec();
                        }
                    }
                }
            }
        }
    }
}

fn delta_content(chunk: &Value) -> Option<&str> {
    chunk
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// Nothing usable arrived before the failure
    #[error("failed to retrieve streamed reply: {0}")]
    Retrieval(String),

    /// The connection dropped after some text arrived
    #[error("streamed reply interrupted: {reason}")]
    Interrupted { partial: String, reason: String },
}

impl StreamError {
    /// Text received before the failure, if any
    pub fn partial(&self) -> Option<&str> {
        match self {
            Self::Retrieval(_) => None,
            Self::Interrupted { partial, .. } => Some(partial),
        }
    }
}

/// Drive `stream` to completion, publishing the accumulated text on every
/// update.
///
/// Stops at `[DONE]` without reading further; a body that ends without the
/// sentinel still counts as success.
pub async fn consume<S, B, E>(mut stream: S, mut on_update: impl FnMut(&str)) -> Result<String, StreamError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) if decoder.text().is_empty() => {
                return Err(StreamError::Retrieval(err.to_string()));
            }
            Err(err) => {
                tracing::warn!("Stream interrupted after {} bytes of text", decoder.text().len());
                return Err(StreamError::Interrupted {
                    partial: decoder.into_text(),
                    reason: err.to_string(),
                });
            }
        };

        if decoder.feed(chunk.as_ref(), &mut on_update) == Progress::Done {
            break;
        }
    }

    Ok(decoder.into_text())
}
