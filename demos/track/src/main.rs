use jobstream::prelude::*;
use jobstream_reqwest::ReqwestTransport;

const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const BASE_URL: &str = "TRACK_BASE_URL";
const SUBJECT_ID: &str = "SUBJECT_ID";
const TARGET_REFERENCE: &str = "TARGET_REFERENCE";

const STEPS: [&str; 4] = ["parsing", "analyzing", "optimizing", "formatting"];

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base_url = std::env::var(BASE_URL).unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
    let subject_id = std::env::var(SUBJECT_ID).unwrap_or_else(|_| "1".to_owned());
    let target_reference =
        std::env::var(TARGET_REFERENCE).map_err(|_| format!("{TARGET_REFERENCE} must be set"))?;
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let tracker = Tracker::new(ReqwestTransport::new()?, TrackerConfig::new(base_url));
    let request = JobRequest::new(subject_id, target_reference)?;
    println!("Tracking {}", tracker.config().job_url(&request));

    let sink = StepCounter::new(STEPS, |progress: StepProgress| {
        println!(
            "[{}/{}] {}: {}",
            progress.position, progress.total, progress.event.step, progress.event.status
        );
    });
    let handle = tracker.track(request, sink);
    let cancel = handle.cancel_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    match handle.await {
        Ok(result) => println!("Completed: {result:#}"),
        Err(err) => {
            println!("Failed ({}): {err}", err.error_type());
            return Err(err.into());
        }
    }
    Ok(())
}
