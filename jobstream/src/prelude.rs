//! The purpose of this module is to alleviate the need to import many of the `[jobstream]` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use jobstream::prelude::*;
//! ```
pub use crate::backoff::BackoffStrategy;
pub use crate::backoff::Jitter;
pub use crate::backoff::Strategy;
pub use crate::config::TrackerConfig;
pub use crate::event::ProgressEvent;
pub use crate::job::{JobRequest, SubjectId};
pub use crate::progress::{ProgressSink, StepCounter, StepProgress};
pub use crate::transport::{Channel, Transport, TransportError};
pub use crate::{CancelHandle, TerminalResult, TrackError, TrackHandle, Tracker};
