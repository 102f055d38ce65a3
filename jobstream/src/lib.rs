//! Client-side tracking of long running server jobs over a server-push channel.
//!
//! A [`Tracker`] opens a channel to a job scoped endpoint, forwards progress to a
//! [`progress::ProgressSink`] and settles exactly once with the job's terminal result. Transient
//! transport failures are retried with a bounded backoff, and an absolute deadline bounds the
//! whole job.
//!
//! # Example
//!
//! ```
//! # use jobstream::prelude::*;
//! # use jobstream::testing::{ScriptedTransport, Session};
//! # use serde_json::json;
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let transport = ScriptedTransport::new().accept(
//!     Session::new()
//!         .frame(json!({"step": "analyzing", "status": "Reading the job posting"}))
//!         .frame(json!({"step": "complete", "result": {"optimizedResumeId": 9}})),
//! );
//! let tracker = Tracker::new(transport, TrackerConfig::default());
//!
//! let request = JobRequest::new(42, "https://jobs.example.com/postings/7").unwrap();
//! let result = tracker
//!     .track(request, |event: ProgressEvent| println!("{}: {}", event.step, event.status))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(result, json!({"optimizedResumeId": 9}));
//! # });
//! ```
use std::{future::IntoFuture, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument;

pub mod backoff;
pub mod config;
pub mod event;
pub mod job;
pub mod prelude;
pub mod progress;
pub mod testing;
pub mod transport;

use config::TrackerConfig;
use event::FrameError;
use job::{runner::JobRunner, JobRequest};
use progress::ProgressSink;
use transport::{Transport, TransportError};

/// The single settlement of a tracked job.
pub type TerminalResult = Result<Value, TrackError>;

const ERROR_TYPE_PROTOCOL: &str = "protocol";
const ERROR_TYPE_RETRIES_EXHAUSTED: &str = "retries_exhausted";
const ERROR_TYPE_TIMEOUT: &str = "timeout";
const ERROR_TYPE_SERVER: &str = "server";
const ERROR_TYPE_CANCELLED: &str = "cancelled";
const ERROR_TYPE_PANIC: &str = "panic";
const ERROR_TYPE_INVALID_REQUEST: &str = "invalid_request";

/// Tracks jobs against a [`Transport`].
///
/// Each call to [`Tracker::track`] spawns an independent task, so one tracker can follow any
/// number of jobs concurrently without them sharing retry counters or deadlines.
pub struct Tracker<T> {
    transport: Arc<T>,
    config: Arc<TrackerConfig>,
}

impl<T> Clone for Tracker<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T> Tracker<T>
where
    T: Transport,
{
    pub fn new(transport: T, config: TrackerConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Starts tracking `request`, delivering progress to `sink`.
    ///
    /// Must be called from within a tokio runtime. The returned handle resolves to the terminal
    /// result and can be used to cancel the job. Dropping the handle also cancels it.
    pub fn track<S>(&self, request: JobRequest, sink: S) -> TrackHandle
    where
        S: ProgressSink + Send + 'static,
    {
        let cancellation = CancellationToken::new();
        let runner = JobRunner::new(self.transport.clone(), self.config.clone(), sink);
        let handle = tokio::spawn(
            runner
                .run(request, cancellation.clone())
                .in_current_span(),
        );
        TrackHandle {
            handle,
            cancellation: cancellation.clone(),
            _guard: cancellation.drop_guard(),
        }
    }

    /// Tracks `request` and waits for its terminal result.
    pub async fn track_to_completion<S>(&self, request: JobRequest, sink: S) -> TerminalResult
    where
        S: ProgressSink + Send + 'static,
    {
        self.track(request, sink).await
    }
}

/// Handle to a tracked job.
///
/// Await it (it implements [`IntoFuture`]) to get the [`TerminalResult`].
pub struct TrackHandle {
    handle: JoinHandle<TerminalResult>,
    cancellation: CancellationToken,
    _guard: DropGuard,
}

impl TrackHandle {
    /// Cancels the job.
    ///
    /// The channel is closed and the job settles with [`TrackError::Cancelled`] unless it had
    /// already settled. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.cancellation.cancel()
    }

    /// A cloneable handle that can cancel this job from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancellation.clone())
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn outcome(self) -> TerminalResult {
        let Self { handle, _guard, .. } = self;
        match handle.await {
            Ok(result) => result,
            Err(error) => Err(error.into()),
        }
    }

    /// Waits for the terminal result and deserializes the success payload into `R`.
    pub async fn outcome_as<R: DeserializeOwned>(self) -> Result<R, TrackError> {
        let value = self.outcome().await?;
        serde_json::from_value(value).map_err(|error| TrackError::Protocol(error.into()))
    }
}

impl IntoFuture for TrackHandle {
    type Output = TerminalResult;
    type IntoFuture = BoxFuture<'static, TerminalResult>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.outcome())
    }
}

/// Cancels a tracked job, see [`TrackHandle::cancel`].
#[derive(Debug, Clone)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

#[derive(Debug, Error)]
pub enum TrackError {
    #[error(transparent)]
    Protocol(#[from] FrameError),
    #[error("Connection failed after {attempts} reconnection attempts: {last_error}")]
    RetriesExhausted {
        attempts: u16,
        #[source]
        last_error: TransportError,
    },
    #[error("Optimization timed out after {0:?}")]
    Timeout(Duration),
    #[error("Optimization failed: {0}")]
    Server(String),
    #[error("Optimization cancelled")]
    Cancelled,
    #[error("Progress handler panicked: {0}")]
    Panicked(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(&'static str),
}

impl TrackError {
    /// A stable identifier of the kind of failure.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Protocol(_) => ERROR_TYPE_PROTOCOL,
            Self::RetriesExhausted { .. } => ERROR_TYPE_RETRIES_EXHAUSTED,
            Self::Timeout(_) => ERROR_TYPE_TIMEOUT,
            Self::Server(_) => ERROR_TYPE_SERVER,
            Self::Cancelled => ERROR_TYPE_CANCELLED,
            Self::Panicked(_) => ERROR_TYPE_PANIC,
            Self::InvalidRequest(_) => ERROR_TYPE_INVALID_REQUEST,
        }
    }
}

impl From<JoinError> for TrackError {
    fn from(value: JoinError) -> Self {
        if value.is_cancelled() {
            return Self::Cancelled;
        }
        let msg = value.to_string();
        let message = match value.try_into_panic() {
            Ok(panic) => panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or(msg),
            Err(_) => msg,
        };
        Self::Panicked(message)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use assert_matches::assert_matches;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::{
        event::ProgressEvent,
        testing::{ScriptedTransport, Session},
    };

    fn request() -> JobRequest {
        JobRequest::new(1, "https://jobs.example.com/1").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn outcome_as_decodes_result() {
        #[derive(Debug, Deserialize, PartialEq)]
        #[serde(rename_all = "camelCase")]
        struct Optimized {
            optimized_resume_id: u32,
            cover_letter: String,
        }

        let transport = ScriptedTransport::new().accept(Session::new().frame(json!({
            "step": "complete",
            "result": {"optimizedResumeId": 3, "coverLetter": "Dear team"}
        })));
        let tracker = Tracker::new(transport, TrackerConfig::default());

        let optimized: Optimized = tracker
            .track(request(), |_: ProgressEvent| {})
            .outcome_as()
            .await
            .unwrap();

        assert_eq!(
            optimized,
            Optimized {
                optimized_resume_id: 3,
                cover_letter: "Dear team".to_owned()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn outcome_as_mismatch_is_protocol_error() {
        let transport = ScriptedTransport::new()
            .accept(Session::new().frame(json!({"step": "complete", "result": "text"})));
        let tracker = Tracker::new(transport, TrackerConfig::default());

        let result = tracker
            .track(request(), |_: ProgressEvent| {})
            .outcome_as::<u32>()
            .await;

        assert_matches!(result, Err(TrackError::Protocol(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn track_to_completion_forwards_progress_to_a_channel() {
        let transport = ScriptedTransport::new().accept(
            Session::new()
                .frame(json!({"step": "parsing", "status": "Reading resume"}))
                .frame(json!({"step": "complete", "result": {"optimizedResumeId": 4}})),
        );
        let tracker = Tracker::new(transport, TrackerConfig::default());
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();

        let result = tracker.track_to_completion(request(), sender).await;

        assert_eq!(result.unwrap(), json!({"optimizedResumeId": 4}));
        assert_eq!(receiver.recv().await.unwrap().step, "parsing");
        assert_eq!(receiver.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_sink_is_reported() {
        let transport = ScriptedTransport::new()
            .accept(Session::new().frame(json!({"step": "parsing", "status": "..."})));
        let tracker = Tracker::new(transport, TrackerConfig::default());

        let result = tracker
            .track(request(), |_: ProgressEvent| panic!("render failed"))
            .await;

        assert_matches!(result, Err(TrackError::Panicked(message)) if message == "render failed");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_cancels_the_job() {
        let transport = ScriptedTransport::new().accept(
            Session::new().frame(json!({"step": "parsing", "status": "..."})),
        );
        let tracker = Tracker::new(transport.clone(), TrackerConfig::default());
        let steps = Arc::new(Mutex::new(Vec::new()));

        let handle = tracker.track(request(), {
            let steps = steps.clone();
            move |event: ProgressEvent| steps.lock().unwrap().push(event.step)
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*steps.lock().unwrap(), vec!["parsing"]);
        assert_eq!(transport.closed(), 1);
    }

    #[test]
    fn error_types_are_distinct() {
        let errors = [
            TrackError::Timeout(Duration::from_secs(1)),
            TrackError::Server("E".to_owned()),
            TrackError::Cancelled,
            TrackError::Panicked("p".to_owned()),
            TrackError::InvalidRequest("r"),
            TrackError::RetriesExhausted {
                attempts: 3,
                last_error: TransportError::Closed,
            },
        ];
        let mut types: Vec<_> = errors.iter().map(TrackError::error_type).collect();
        types.sort();
        types.dedup();

        assert_eq!(types.len(), errors.len());
        assert!(TrackError::Server("quota exceeded".to_owned())
            .to_string()
            .contains("quota exceeded"));
        assert!(TrackError::Timeout(Duration::from_secs(120))
            .to_string()
            .contains("timed out"));
        let exhausted = TrackError::RetriesExhausted {
            attempts: 3,
            last_error: TransportError::Status(503),
        }
        .to_string();
        assert!(exhausted.contains("3 reconnection attempts"));
        assert!(exhausted.contains("503"));
        assert!(TrackError::Cancelled.to_string().contains("cancelled"));
        assert!(TrackError::Panicked("p".to_owned())
            .to_string()
            .contains("panicked"));
    }
}
