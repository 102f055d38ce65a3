//! The capability the tracker uses to open server-push channels.
//!
//! The tracker owns all retry and timeout policy, a [`Transport`] only needs to open a channel
//! for a URL and hand out the messages it receives. This keeps the state machine independent of
//! the network stack: `jobstream-reqwest` provides a Server-Sent Events implementation and
//! [`crate::testing::ScriptedTransport`] a scripted one for tests.
use async_trait::async_trait;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Channel: Channel;

    /// Opens a channel for `url`.
    ///
    /// Returning means the channel is open, any error is treated as a transient failure and
    /// retried according to the tracker's backoff.
    async fn open(&self, url: &str) -> Result<Self::Channel, TransportError>;
}

#[async_trait]
pub trait Channel: Send + 'static {
    /// Waits for the next message.
    ///
    /// `Ok(None)` signals that the server ended the stream.
    async fn next_message(&mut self) -> Result<Option<String>, TransportError>;

    async fn close(&mut self);
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect: {0}")]
    Connect(#[source] BoxError),
    #[error("Server responded with status {0}")]
    Status(u16),
    #[error("Unexpected response: {0}")]
    Protocol(String),
    #[error("Error reading from stream: {0}")]
    Stream(#[source] BoxError),
    #[error("Stream closed by server")]
    Closed,
}
