//! Helpers for testing code built on the tracker without a network.
//!
//! [`ScriptedTransport`] plays back a scripted sequence of connections. Each call to
//! [`Transport::open`] takes the next scripted connection: either a refusal or a [`Session`]
//! of messages, waits, and stream failures. Opens and closes are recorded (against tokio's clock,
//! so tests can run with a paused clock) for assertions about reconnection timing.
//!
//! # Example
//!
//! ```
//! # use jobstream::prelude::*;
//! # use jobstream::testing::{ScriptedTransport, Session};
//! # use serde_json::json;
//! # tokio::runtime::Builder::new_current_thread().enable_time().start_paused(true).build().unwrap().block_on(async {
//! let transport = ScriptedTransport::new()
//!     .refuse()
//!     .accept(Session::new().frame(json!({"step": "complete", "result": 1})));
//! let tracker = Tracker::new(transport.clone(), TrackerConfig::default());
//!
//! let request = JobRequest::new(1, "https://jobs.example.com/1").unwrap();
//! let result = tracker.track(request, |_: ProgressEvent| {}).await;
//!
//! assert_eq!(result.unwrap(), json!(1));
//! let opened = transport.opened();
//! assert_eq!(opened[1].1 - opened[0].1, std::time::Duration::from_secs(1));
//! # });
//! ```
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use crate::transport::{Channel, Transport, TransportError};

#[derive(Debug, Clone)]
enum Item {
    Message(String),
    Wait(Duration),
    Fail,
    End,
}

/// The scripted behaviour of one open channel.
///
/// Items are played back in order. Once a session runs out of items the channel stays open and
/// silent, as a server still working on the job would.
#[derive(Debug, Clone, Default)]
pub struct Session {
    items: VecDeque<Item>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `frame` serialized as JSON.
    pub fn frame(self, frame: Value) -> Self {
        self.raw(frame.to_string())
    }

    /// Sends `message` verbatim, e.g. a malformed frame.
    pub fn raw(mut self, message: impl Into<String>) -> Self {
        self.items.push_back(Item::Message(message.into()));
        self
    }

    /// Waits before playing the next item.
    pub fn wait(mut self, delay: Duration) -> Self {
        self.items.push_back(Item::Wait(delay));
        self
    }

    /// Fails the channel with a transport error.
    pub fn fail(mut self) -> Self {
        self.items.push_back(Item::Fail);
        self
    }

    /// Ends the stream as a server closing the connection would.
    pub fn end(mut self) -> Self {
        self.items.push_back(Item::End);
        self
    }
}

#[derive(Debug)]
enum Connection {
    Refuse,
    Accept(Session),
}

#[derive(Debug, Default)]
struct State {
    default_script: VecDeque<Connection>,
    scripts: HashMap<String, VecDeque<Connection>>,
    opened: Vec<(String, Instant)>,
    sessions: Vec<Arc<Mutex<VecDeque<Item>>>>,
    closed: usize,
}

/// A [`Transport`] playing back scripted connections.
///
/// Connections scripted for a specific URL with [`ScriptedTransport::accept_for`] or
/// [`ScriptedTransport::refuse_for`] take precedence over the default script. When no script is
/// left for a URL the connection is refused.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<State>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(self, session: Session) -> Self {
        self.lock().default_script.push_back(Connection::Accept(session));
        self
    }

    pub fn refuse(self) -> Self {
        self.lock().default_script.push_back(Connection::Refuse);
        self
    }

    pub fn accept_for(self, url: impl Into<String>, session: Session) -> Self {
        self.lock()
            .scripts
            .entry(url.into())
            .or_default()
            .push_back(Connection::Accept(session));
        self
    }

    pub fn refuse_for(self, url: impl Into<String>) -> Self {
        self.lock()
            .scripts
            .entry(url.into())
            .or_default()
            .push_back(Connection::Refuse);
        self
    }

    /// Every call to [`Transport::open`] with its URL and time, refused ones included.
    pub fn opened(&self) -> Vec<(String, Instant)> {
        self.lock().opened.clone()
    }

    /// The number of channels closed by the caller.
    pub fn closed(&self) -> usize {
        self.lock().closed
    }

    /// Messages of opened sessions that were never read.
    pub fn unread_frames(&self) -> usize {
        self.lock()
            .sessions
            .iter()
            .map(|session| {
                session
                    .lock()
                    .expect("session lock poisoned")
                    .iter()
                    .filter(|item| matches!(item, Item::Message(_)))
                    .count()
            })
            .sum()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("scripted transport lock poisoned")
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Channel = ScriptedChannel;

    async fn open(&self, url: &str) -> Result<Self::Channel, TransportError> {
        let mut state = self.lock();
        state.opened.push((url.to_owned(), Instant::now()));
        let next = match state.scripts.get_mut(url) {
            Some(script) if !script.is_empty() => script.pop_front(),
            _ => state.default_script.pop_front(),
        };
        match next {
            Some(Connection::Accept(session)) => {
                let items = Arc::new(Mutex::new(session.items));
                state.sessions.push(items.clone());
                Ok(ScriptedChannel {
                    items,
                    state: self.state.clone(),
                })
            }
            Some(Connection::Refuse) | None => Err(TransportError::Connect(
                format!("scripted refusal for {url}").into(),
            )),
        }
    }
}

/// Channel handed out by [`ScriptedTransport`].
#[derive(Debug)]
pub struct ScriptedChannel {
    items: Arc<Mutex<VecDeque<Item>>>,
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Channel for ScriptedChannel {
    async fn next_message(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let next = self.items.lock().expect("session lock poisoned").pop_front();
            match next {
                Some(Item::Message(message)) => return Ok(Some(message)),
                Some(Item::Wait(delay)) => tokio::time::sleep(delay).await,
                Some(Item::Fail) => {
                    return Err(TransportError::Stream("scripted stream failure".into()))
                }
                Some(Item::End) => return Ok(None),
                None => std::future::pending::<()>().await,
            }
        }
    }

    async fn close(&mut self) {
        self.state
            .lock()
            .expect("scripted transport lock poisoned")
            .closed += 1;
    }
}
