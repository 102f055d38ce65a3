use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use assert_matches::assert_matches;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Router,
};
use chrono::TimeDelta;
use jobstream::prelude::*;
use jobstream_reqwest::ReqwestTransport;
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct Server {
    requests: Arc<AtomicUsize>,
    unavailable_for: usize,
    frames: Vec<Value>,
}

async fn optimize(
    State(server): State<Server>,
    Path(resume_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let request = server.requests.fetch_add(1, Ordering::SeqCst);
    if request < server.unavailable_for {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let mut frames = server.frames.clone();
    for frame in frames.iter_mut() {
        if frame["step"] == "complete" {
            frame["result"]["resumeId"] = json!(resume_id);
            frame["result"]["targetReference"] = json!(query.get("targetReference"));
        }
    }
    let events = frames
        .into_iter()
        .map(|frame| Ok::<_, Infallible>(Event::default().data(frame.to_string())));
    Sse::new(futures::stream::iter(events)).into_response()
}

async fn not_a_stream() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], "{}")
}

async fn spawn(server: Server) -> String {
    let app = Router::new()
        .route("/api/resumes/:resume_id/optimize", get(optimize))
        .route("/plain", get(not_a_stream))
        .with_state(server);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

fn config(base_url: &str) -> TrackerConfig {
    TrackerConfig::new(base_url)
        .with_backoff(BackoffStrategy::constant(TimeDelta::milliseconds(10)))
        .with_timeout(Duration::from_secs(10))
}

#[tokio::test]
async fn tracks_progress_to_completion() {
    let base_url = spawn(Server {
        frames: vec![
            json!({"step": "parsing", "status": "Reading resume"}),
            json!({"step": "analyzing", "status": "Matching job posting", "details": {"keywords": 12}}),
            json!({"step": "complete", "result": {"optimizedResumeId": 5}}),
        ],
        ..Default::default()
    })
    .await;
    let tracker = Tracker::new(ReqwestTransport::new().unwrap(), config(&base_url));
    let events = Arc::new(Mutex::new(Vec::new()));

    let request = JobRequest::new(7, "https://jobs.example.com/postings/1?ref=a b").unwrap();
    let result = tracker
        .track(request, {
            let events = events.clone();
            move |event: ProgressEvent| events.lock().unwrap().push(event)
        })
        .await
        .unwrap();

    assert_eq!(
        result,
        json!({
            "optimizedResumeId": 5,
            "resumeId": "7",
            "targetReference": "https://jobs.example.com/postings/1?ref=a b",
        })
    );
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].step, "parsing");
    assert_eq!(events[1].details, Some(json!({"keywords": 12})));
}

#[tokio::test]
async fn reconnects_after_unavailable_responses() {
    let server = Server {
        unavailable_for: 2,
        frames: vec![json!({"step": "complete", "result": {}})],
        ..Default::default()
    };
    let requests = server.requests.clone();
    let base_url = spawn(server).await;
    let tracker = Tracker::new(ReqwestTransport::new().unwrap(), config(&base_url));

    let request = JobRequest::new(1, "https://jobs.example.com/1").unwrap();
    let result = tracker.track(request, |_: ProgressEvent| {}).await;

    assert!(result.is_ok());
    assert_eq!(requests.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn stream_that_keeps_ending_runs_until_timeout() {
    let server = Server {
        frames: vec![json!({"step": "parsing", "status": "Reading resume"})],
        ..Default::default()
    };
    let requests = server.requests.clone();
    let base_url = spawn(server).await;
    let tracker = Tracker::new(
        ReqwestTransport::new().unwrap(),
        config(&base_url).with_timeout(Duration::from_secs(1)),
    );

    let request = JobRequest::new(1, "https://jobs.example.com/1").unwrap();
    let result = tracker.track(request, |_: ProgressEvent| {}).await;

    // Each reconnect opens successfully, so the budget resets and only the timeout can stop it
    assert_matches!(result, Err(TrackError::Timeout(_)));
    assert!(requests.load(Ordering::SeqCst) > 4);
}

#[tokio::test]
async fn server_reported_error() {
    let base_url = spawn(Server {
        frames: vec![json!({"step": "error", "error": "Could not fetch job posting"})],
        ..Default::default()
    })
    .await;
    let tracker = Tracker::new(ReqwestTransport::new().unwrap(), config(&base_url));

    let request = JobRequest::new(1, "https://jobs.example.com/1").unwrap();
    let result = tracker.track(request, |_: ProgressEvent| {}).await;

    assert_matches!(result, Err(TrackError::Server(message)) if message == "Could not fetch job posting");
}

#[tokio::test]
async fn rejects_non_event_stream_responses() {
    let base_url = spawn(Server::default()).await;
    let transport = ReqwestTransport::new().unwrap();

    assert_matches!(
        transport.open(&format!("{base_url}/plain")).await,
        Err(TransportError::Protocol(_))
    );
    assert_matches!(
        transport.open(&format!("{base_url}/missing")).await,
        Err(TransportError::Status(404))
    );
}

#[tokio::test]
async fn channel_reports_end_of_stream() {
    let base_url = spawn(Server {
        frames: vec![json!({"step": "parsing"})],
        ..Default::default()
    })
    .await;
    let transport = ReqwestTransport::new().unwrap();

    let mut channel = transport
        .open(&format!("{base_url}/api/resumes/1/optimize?targetReference=x"))
        .await
        .unwrap();

    assert_eq!(
        channel.next_message().await.unwrap(),
        Some(r#"{"step":"parsing"}"#.to_owned())
    );
    assert_matches!(channel.next_message().await, Ok(None));
    channel.close().await;
    assert_matches!(channel.next_message().await, Ok(None));
}
