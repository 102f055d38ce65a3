//! Incremental decoder for the `text/event-stream` format.
//!
//! Only the `data` field is of interest to the tracker. `event`, `id` and `retry` fields are
//! accepted and ignored since reconnection is handled by the tracker itself.
use thiserror::Error;

/// The default upper bound on the size of a single buffered event.
pub const MAX_EVENT_BYTES: usize = 4 * 1024 * 1024;

/// A single event grew past the decoder's limit without being dispatched.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Event exceeds the maximum size of {limit} bytes")]
pub struct EventTooLarge {
    pub limit: usize,
}

/// Splits a byte stream into event payloads.
///
/// Chunks may be split at any byte, including within a multi-byte UTF-8 sequence or between the
/// `\r` and `\n` of a line ending. By default at most [`MAX_EVENT_BYTES`] of a pending event are buffered.
///
/// # Example
///
/// ```
/// # use jobstream_reqwest::SseDecoder;
/// let mut decoder = SseDecoder::default();
///
/// assert!(decoder.feed(b"data: {\"step\":").unwrap().is_empty());
/// assert_eq!(
///     decoder.feed(b"\"complete\"}\n\n").unwrap(),
///     vec![r#"{"step":"complete"}"#]
/// );
/// ```
#[derive(Debug)]
pub struct SseDecoder {
    line: Vec<u8>,
    data: String,
    has_data: bool,
    after_cr: bool,
    started: bool,
    max_event_bytes: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_event_bytes(MAX_EVENT_BYTES)
    }
}

impl SseDecoder {
    const BOM: &'static str = "\u{feff}";

    pub fn with_max_event_bytes(max_event_bytes: usize) -> Self {
        Self {
            line: Vec::new(),
            data: String::new(),
            has_data: false,
            after_cr: false,
            started: false,
            max_event_bytes,
        }
    }

    /// Consumes `chunk` returning the payloads of every event it completes.
    ///
    /// Fails once the pending event outgrows the limit. The pending event is discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, EventTooLarge> {
        let mut events = Vec::new();
        for &byte in chunk {
            if std::mem::take(&mut self.after_cr) && byte == b'\n' {
                continue;
            }
            match byte {
                b'\r' | b'\n' => {
                    self.after_cr = byte == b'\r';
                    let line = std::mem::take(&mut self.line);
                    if let Some(event) = self.process_line(&line) {
                        events.push(event);
                    }
                }
                _ => {
                    self.line.push(byte);
                    if self.line.len() + self.data.len() > self.max_event_bytes {
                        self.discard();
                        return Err(EventTooLarge {
                            limit: self.max_event_bytes,
                        });
                    }
                }
            }
        }
        Ok(events)
    }

    fn discard(&mut self) {
        self.line.clear();
        self.data.clear();
        self.has_data = false;
    }

    fn process_line(&mut self, line: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(line);
        let line = if std::mem::replace(&mut self.started, true) {
            &line[..]
        } else {
            line.strip_prefix(Self::BOM).unwrap_or(&line)
        };

        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "event" | "id" | "retry" => {
                tracing::trace!(field, value, "Ignoring event stream field");
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if !std::mem::take(&mut self.has_data) {
            return None;
        }
        Some(std::mem::take(&mut self.data))
    }
}
