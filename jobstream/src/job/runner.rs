use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::{
    config::TrackerConfig,
    event::Frame,
    progress::ProgressSink,
    transport::{Channel, Transport, TransportError},
    TerminalResult, TrackError,
};

use super::JobRequest;

/// Reconnection bookkeeping for a single job.
///
/// The count starts at zero, is reset whenever a channel opens, and is incremented before each
/// reconnection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConnectionAttempt {
    attempt: u16,
}

impl ConnectionAttempt {
    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Advances to the next attempt returning the delay to wait before it, or [`None`] when the
    /// reconnection budget is spent.
    pub(crate) fn next_delay(&mut self, config: &TrackerConfig) -> Option<Duration> {
        if self.attempt >= config.max_reconnect_attempts() {
            return None;
        }
        self.attempt += 1;
        Some(config.reconnect_delay(self.attempt))
    }

    pub(crate) fn count(&self) -> u16 {
        self.attempt
    }
}

/// Drives one job through `Connecting → Open → Reconnecting → … → Terminated`.
pub(crate) struct JobRunner<T, S>
where
    T: Transport,
{
    transport: Arc<T>,
    config: Arc<TrackerConfig>,
    sink: S,
}

impl<T, S> JobRunner<T, S>
where
    T: Transport,
    S: ProgressSink + Send + 'static,
{
    pub(crate) fn new(transport: Arc<T>, config: Arc<TrackerConfig>, sink: S) -> Self {
        Self {
            transport,
            config,
            sink,
        }
    }

    #[instrument(skip_all, fields(subject_id = %request.subject_id()))]
    pub(crate) async fn run(
        mut self,
        request: JobRequest,
        cancellation: CancellationToken,
    ) -> TerminalResult {
        let url = self.config.job_url(&request);
        let timeout = self.config.timeout();
        let mut channel = None;

        tracing::debug!(%url, "Tracking job");

        let outcome = tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(TrackError::Cancelled),
            _ = tokio::time::sleep(timeout) => Err(TrackError::Timeout(timeout)),
            outcome = self.drive(&url, &mut channel) => outcome,
        };

        if let Some(mut channel) = channel.take() {
            channel.close().await;
        }

        match &outcome {
            Ok(_) => tracing::debug!("Job complete"),
            Err(TrackError::Cancelled) => tracing::debug!("Job tracking cancelled"),
            Err(error) => tracing::error!(
                ?error,
                error_type = error.error_type(),
                "Job failed: {error}"
            ),
        }
        outcome
    }

    /// Runs the connection state machine until a terminal outcome.
    ///
    /// The open channel is kept in `slot` so it can be closed even if this future is dropped
    /// part way through.
    async fn drive(&mut self, url: &str, slot: &mut Option<T::Channel>) -> TerminalResult {
        let mut attempt = ConnectionAttempt::default();
        loop {
            let error = match self.transport.open(url).await {
                Ok(channel) => {
                    tracing::debug!(attempt = attempt.count(), "Progress channel open");
                    attempt.reset();
                    let channel = slot.insert(channel);
                    match self.consume(channel).await {
                        Ok(outcome) => return outcome,
                        Err(error) => {
                            if let Some(mut channel) = slot.take() {
                                channel.close().await;
                            }
                            error
                        }
                    }
                }
                Err(error) => error,
            };

            let Some(delay) = attempt.next_delay(&self.config) else {
                return Err(TrackError::RetriesExhausted {
                    attempts: attempt.count(),
                    last_error: error,
                });
            };
            tracing::warn!(
                ?error,
                attempt = attempt.count(),
                "Progress channel failed, reconnecting in {delay:?}: {error}"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Reads messages from an open channel.
    ///
    /// Returns the terminal outcome once one is reached, or the transport error that
    /// interrupted the channel.
    async fn consume(&mut self, channel: &mut T::Channel) -> Result<TerminalResult, TransportError> {
        loop {
            let Some(message) = channel.next_message().await? else {
                return Err(TransportError::Closed);
            };
            match Frame::parse(&message) {
                Ok(Frame::Progress(event)) => {
                    tracing::debug!(step = %event.step, status = %event.status, "Job progress");
                    self.sink.on_progress(event);
                }
                Ok(Frame::Complete(result)) => return Ok(Ok(result)),
                Ok(Frame::Failed(message)) => return Ok(Err(TrackError::Server(message))),
                Err(error) => return Ok(Err(error.into())),
            }
        }
    }
}
