use std::{collections::VecDeque, fmt};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt};
use jobstream::transport::{Channel, TransportError};

use crate::decoder::SseDecoder;

/// An open event stream, yielding the `data` of each dispatched event.
pub struct EventStream {
    body: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
    decoder: SseDecoder,
    ready: VecDeque<String>,
}

impl EventStream {
    pub(crate) fn new(body: BoxStream<'static, reqwest::Result<Bytes>>) -> Self {
        Self::with_decoder(body, SseDecoder::default())
    }

    pub(crate) fn with_decoder(
        body: BoxStream<'static, reqwest::Result<Bytes>>,
        decoder: SseDecoder,
    ) -> Self {
        Self {
            body: Some(body),
            decoder,
            ready: VecDeque::new(),
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("open", &self.body.is_some())
            .field("ready", &self.ready.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Channel for EventStream {
    async fn next_message(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            if let Some(message) = self.ready.pop_front() {
                return Ok(Some(message));
            }
            let Some(body) = self.body.as_mut() else {
                return Ok(None);
            };
            match body.next().await {
                Some(Ok(chunk)) => match self.decoder.feed(&chunk) {
                    Ok(events) => self.ready.extend(events),
                    Err(err) => {
                        self.body = None;
                        return Err(TransportError::Protocol(err.to_string()));
                    }
                },
                Some(Err(err)) => return Err(TransportError::Stream(Box::new(err))),
                None => {
                    // An event without its terminating blank line is discarded
                    self.body = None;
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) {
        self.body = None;
        self.ready.clear();
    }
}
