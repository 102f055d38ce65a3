//! A [`jobstream`] transport opening Server-Sent Events channels with [`reqwest`].
//!
//! ```no_run
//! # use jobstream::prelude::*;
//! # use jobstream_reqwest::ReqwestTransport;
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = ReqwestTransport::new()?;
//! let tracker = Tracker::new(transport, TrackerConfig::new("http://localhost:3000"));
//!
//! let request = JobRequest::new(42, "https://jobs.example.com/postings/7")?;
//! let result = tracker
//!     .track(request, |event: ProgressEvent| println!("{}: {}", event.step, event.status))
//!     .await?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```
use std::ops::Deref;

use async_trait::async_trait;
use futures::StreamExt;
use jobstream::transport::{Transport, TransportError};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_TYPE},
    Client,
};
use tracing::instrument;

mod decoder;
mod stream;

pub use decoder::{EventTooLarge, SseDecoder, MAX_EVENT_BYTES};
pub use stream::EventStream;

const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Opens progress channels as `GET` requests expecting `text/event-stream` responses.
///
/// The client keeps a cookie store so session cookies set by the application are sent with
/// every channel, mirroring the ambient credentials of a browser.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_default_headers(HeaderMap::new())
    }

    /// Sends `headers` (e.g. an `Authorization` or `Cookie` header) with every channel request.
    pub fn with_default_headers(headers: HeaderMap) -> Result<Self, TransportError> {
        let client = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .build()
            .map_err(|err| TransportError::Connect(Box::new(err)))?;
        Ok(Self { client })
    }
}

impl Deref for ReqwestTransport {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl From<Client> for ReqwestTransport {
    fn from(client: Client) -> Self {
        Self { client }
    }
}

impl From<&Client> for ReqwestTransport {
    fn from(client: &Client) -> Self {
        Self {
            client: client.to_owned(),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    type Channel = EventStream;

    #[instrument(skip(self))]
    async fn open(&self, url: &str) -> Result<Self::Channel, TransportError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, HeaderValue::from_static(EVENT_STREAM_MIME))
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .send()
            .await
            .map_err(|err| TransportError::Connect(Box::new(err)))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%status, "Event stream request rejected");
            return Err(TransportError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with(EVENT_STREAM_MIME) {
            return Err(TransportError::Protocol(format!(
                "expected {EVENT_STREAM_MIME} response, got '{content_type}'"
            )));
        }

        Ok(EventStream::new(response.bytes_stream().boxed()))
    }
}
