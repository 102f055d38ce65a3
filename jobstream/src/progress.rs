//! Delivery of progress updates to the caller.
//!
//! Anything implementing [`ProgressSink`] can receive the [`ProgressEvent`]s of a tracked job.
//! Closures and unbounded channel senders implement it out of the box, and [`StepCounter`]
//! turns the raw events into "step N of M" updates for rendering.
use tokio::sync::mpsc;

use crate::event::ProgressEvent;

/// Receives progress updates in the order they arrive on the channel.
///
/// Implementations should not panic. A panicking sink aborts the tracking task and the job
/// settles with [`crate::TrackError::Panicked`].
#[cfg_attr(test, mockall::automock)]
pub trait ProgressSink {
    fn on_progress(&mut self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(ProgressEvent),
{
    fn on_progress(&mut self, event: ProgressEvent) {
        self(event)
    }
}

impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    fn on_progress(&mut self, event: ProgressEvent) {
        if let Err(err) = self.send(event) {
            tracing::debug!(step = %err.0.step, "Progress receiver dropped");
        }
    }
}

/// A progress update annotated with its position in a known sequence of steps.
#[derive(Debug, Clone, PartialEq)]
pub struct StepProgress {
    pub event: ProgressEvent,
    /// 1-indexed position of the latest known step seen so far, `0` before any known step.
    pub position: usize,
    pub total: usize,
}

/// Sink adapter which maps steps onto an expected ordered list of steps.
///
/// Unknown steps are forwarded without advancing the position, and the position never moves
/// backwards, so a UI can render a monotonic "step N of M" indicator.
///
/// # Example
///
/// ```
/// # use jobstream::prelude::*;
/// let mut seen = Vec::new();
/// let mut counter = StepCounter::new(["parsing", "analyzing", "writing"], |progress: StepProgress| {
///     seen.push((progress.position, progress.total));
/// });
///
/// counter.on_progress(ProgressEvent { step: "analyzing".into(), status: "".into(), details: None });
/// counter.on_progress(ProgressEvent { step: "retrying".into(), status: "".into(), details: None });
/// drop(counter);
///
/// assert_eq!(seen, vec![(2, 3), (2, 3)]);
/// ```
pub struct StepCounter<F> {
    steps: Vec<String>,
    position: usize,
    inner: F,
}

impl<F> StepCounter<F>
where
    F: FnMut(StepProgress),
{
    pub fn new<I, S>(steps: I, inner: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: steps.into_iter().map(Into::into).collect(),
            position: 0,
            inner,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn total(&self) -> usize {
        self.steps.len()
    }
}

impl<F> ProgressSink for StepCounter<F>
where
    F: FnMut(StepProgress),
{
    fn on_progress(&mut self, event: ProgressEvent) {
        if let Some(index) = self.steps.iter().position(|step| *step == event.step) {
            self.position = self.position.max(index + 1);
        }
        let progress = StepProgress {
            event,
            position: self.position,
            total: self.steps.len(),
        };
        (self.inner)(progress)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn event(step: &str) -> ProgressEvent {
        ProgressEvent {
            step: step.to_owned(),
            status: format!("{step} status"),
            details: None,
        }
    }

    #[test]
    fn closures_are_sinks() {
        let mut steps = Vec::new();
        let mut sink = |event: ProgressEvent| steps.push(event.step);
        sink.on_progress(event("a"));
        sink.on_progress(event("b"));

        assert_eq!(steps, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unbounded_sender_is_a_sink() {
        let (mut sender, mut receiver) = mpsc::unbounded_channel();
        sender.on_progress(event("parsing"));

        assert_eq!(receiver.recv().await, Some(event("parsing")));

        drop(receiver);
        // Must not panic once the receiver is gone
        sender.on_progress(event("parsing"));
    }

    #[test]
    fn step_counter_is_monotonic() {
        let mut positions = Vec::new();
        let mut counter = StepCounter::new(["parsing", "analyzing", "writing"], |p: StepProgress| {
            positions.push(p.position)
        });

        counter.on_progress(event("parsing"));
        counter.on_progress(event("writing"));
        counter.on_progress(event("analyzing"));
        counter.on_progress(event("unknown"));
        assert_eq!(counter.position(), 3);
        assert_eq!(counter.total(), 3);
        drop(counter);

        assert_eq!(positions, vec![1, 3, 3, 3]);
    }

    #[test]
    fn step_counter_before_any_known_step() {
        let mut last = None;
        let mut counter = StepCounter::new(["parsing"], |p: StepProgress| last = Some(p));
        counter.on_progress(event("queued"));
        drop(counter);

        let last = last.unwrap();
        assert_eq!(last.position, 0);
        assert_eq!(last.total, 1);
        assert_eq!(last.event.step, "queued");
    }
}
