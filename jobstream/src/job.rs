use std::fmt::Display;

use crate::TrackError;

pub(crate) mod runner;

/// Identifier of the resource being processed, e.g. the id of an uploaded resume.
///
/// Servers use both numeric and string identifiers so either converts into a [`SubjectId`].
#[derive(Debug, Eq, PartialEq, Clone, Hash)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for SubjectId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<i32> for SubjectId {
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for SubjectId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for SubjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single optimization job: which subject to process against which target.
///
/// Requests are validated on construction and are immutable afterwards.
///
/// # Example
///
/// ```
/// # use jobstream::prelude::*;
/// let request = JobRequest::new(42, "https://jobs.example.com/postings/7").unwrap();
///
/// assert_eq!(request.subject_id().as_str(), "42");
/// assert!(JobRequest::new("", "https://jobs.example.com").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    subject_id: SubjectId,
    target_reference: String,
}

impl JobRequest {
    pub fn new(
        subject_id: impl Into<SubjectId>,
        target_reference: impl Into<String>,
    ) -> Result<Self, TrackError> {
        let subject_id = subject_id.into();
        let target_reference = target_reference.into();
        if subject_id.as_str().trim().is_empty() {
            return Err(TrackError::InvalidRequest("subject id must not be empty"));
        }
        if target_reference.trim().is_empty() {
            return Err(TrackError::InvalidRequest(
                "target reference must not be empty",
            ));
        }
        Ok(Self {
            subject_id,
            target_reference,
        })
    }

    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    pub fn target_reference(&self) -> &str {
        &self.target_reference
    }
}
