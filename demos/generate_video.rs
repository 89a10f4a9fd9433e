//! Generate one or more videos from a prompt and save them to the current directory.
//!
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run --example generate_video -- "A lighthouse at dawn" 2
//! ```
//!
//! Ctrl+C stops polling; videos that already finished are still saved.

use futures::StreamExt;
use vidgen_dl::{
    BatchOrchestrator, Config, Event, JobRequest, MemberOutcome, Seconds, run_until_signal,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidgen_dl=info".into()),
        )
        .init();
    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let prompt = args
        .next()
        .unwrap_or_else(|| "A paper boat drifting on a calm pond".to_string());
    let replicas: usize = args.next().and_then(|n| n.parse().ok()).unwrap_or(1);

    let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| "OPENAI_API_KEY is not set")?;
    let mut config = Config::new(api_key);
    config.download.output_dir = Some(std::env::current_dir()?);

    let orchestrator = BatchOrchestrator::new(config)?;
    let request = JobRequest::new(prompt).with_seconds(Seconds::Four);
    let mut session = orchestrator.submit_batch(request.replicas(replicas)).await?;

    let mut events = session.event_stream();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Event::Progress {
                    index,
                    raw_status,
                    progress,
                    ..
                } => println!("[{}] Status: {} ({}%)", index, raw_status, progress),
                Event::Downloading {
                    index, fraction, ..
                } => println!("[{}] Downloading {:.0}%", index, fraction * 100.0),
                Event::BatchComplete { succeeded, failed } => {
                    println!("Done: {} succeeded, {} failed", succeeded, failed);
                    break;
                }
                other => println!("{:?}", other),
            }
        }
    });

    run_until_signal(&mut session).await;
    // Publish any events still queued after a shutdown
    while session.next_event().await.is_some() {}
    printer.await?;

    for member in session.members() {
        match &member.outcome {
            Some(MemberOutcome::Downloaded {
                path: Some(path), ..
            }) => println!("[{}] Saved {}", member.index, path.display()),
            Some(MemberOutcome::Downloaded { size_bytes, .. }) => {
                println!("[{}] Downloaded {} bytes", member.index, size_bytes)
            }
            Some(other) => println!("[{}] {:?}", member.index, other),
            None => println!("[{}] still running", member.index),
        }
    }

    Ok(())
}
