use std::{fmt, sync::Arc, time::Duration};

use chrono::TimeDelta;

use crate::{
    backoff::{BackoffStrategy, Linear, Strategy},
    job::JobRequest,
};

/// The default absolute deadline for a tracked job, measured from the start of tracking.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(120_000);

/// The default number of reconnection attempts after a transport error.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u16 = 3;

/// The default reconnection backoff: linear, one second per attempt, without jitter.
pub const DEFAULT_BACKOFF_STRATEGY: BackoffStrategy<Linear> =
    BackoffStrategy::linear(TimeDelta::seconds(1));

const DEFAULT_RESOURCE: &str = "api/resumes";
const DEFAULT_ACTION: &str = "optimize";
const DEFAULT_QUERY_PARAMETER: &str = "targetReference";

/// Configuration shared by every job tracked with a [`crate::Tracker`].
///
/// Jobs are tracked at `{base_url}/{resource}/{subject_id}/{action}?{query_parameter}=<target>`.
///
/// # Example
///
/// ```
/// # use jobstream::prelude::*;
/// # use std::time::Duration;
/// # use chrono::TimeDelta;
/// let config = TrackerConfig::new("https://app.example.com/")
///     .with_timeout(Duration::from_secs(300))
///     .with_max_reconnect_attempts(5)
///     .with_backoff(BackoffStrategy::exponential(TimeDelta::seconds(1)));
///
/// let request = JobRequest::new(42, "https://jobs.example.com/a b").unwrap();
/// assert_eq!(
///     config.job_url(&request),
///     "https://app.example.com/api/resumes/42/optimize?targetReference=https%3A%2F%2Fjobs.example.com%2Fa%20b",
/// );
/// ```
#[derive(Clone)]
pub struct TrackerConfig {
    base_url: String,
    resource: String,
    action: String,
    query_parameter: String,
    timeout: Duration,
    max_reconnect_attempts: u16,
    backoff: Arc<dyn Strategy + Send + Sync>,
}

impl TrackerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            resource: DEFAULT_RESOURCE.to_owned(),
            action: DEFAULT_ACTION.to_owned(),
            query_parameter: DEFAULT_QUERY_PARAMETER.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            backoff: Arc::new(DEFAULT_BACKOFF_STRATEGY),
        }
    }

    /// Path segment(s) of the resource collection, `"api/resumes"` by default.
    pub fn with_resource(self, resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..self
        }
    }

    pub fn with_action(self, action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..self
        }
    }

    pub fn with_query_parameter(self, query_parameter: impl Into<String>) -> Self {
        Self {
            query_parameter: query_parameter.into(),
            ..self
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    pub fn with_max_reconnect_attempts(self, max_reconnect_attempts: u16) -> Self {
        Self {
            max_reconnect_attempts,
            ..self
        }
    }

    pub fn with_backoff(self, backoff: impl Strategy + Send + Sync + 'static) -> Self {
        Self {
            backoff: Arc::new(backoff),
            ..self
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_reconnect_attempts(&self) -> u16 {
        self.max_reconnect_attempts
    }

    /// The delay before the 1-indexed reconnection `attempt`.
    pub fn reconnect_delay(&self, attempt: u16) -> Duration {
        self.backoff.backoff(attempt).to_std().unwrap_or(Duration::ZERO)
    }

    /// The URL of the progress channel for `request`.
    pub fn job_url(&self, request: &JobRequest) -> String {
        format!(
            "{}/{}/{}/{}?{}={}",
            self.base_url.trim_end_matches('/'),
            self.resource.trim_matches('/'),
            urlencoding::encode(request.subject_id().as_str()),
            self.action.trim_matches('/'),
            urlencoding::encode(&self.query_parameter),
            urlencoding::encode(request.target_reference()),
        )
    }
}

impl Default for TrackerConfig {
    /// Relative URLs with all defaults.
    fn default() -> Self {
        Self::new("")
    }
}

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("base_url", &self.base_url)
            .field("resource", &self.resource)
            .field("action", &self.action)
            .field("query_parameter", &self.query_parameter)
            .field("timeout", &self.timeout)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .finish_non_exhaustive()
    }
}
