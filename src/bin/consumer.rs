//! Scan consumer: process at most one queued scan task, then exit.
//!
//! Usage: `cargo run --bin consumer`
//!
//! Requires `QUEUE_URL` and `S3_BUCKET` (reads .env). Exits 0 whether or not
//! a message was found; only startup failures, a failing queue receive or
//! an exhausted cycle budget exit non-zero.

use mimalloc::MiMalloc;
use scanflow::clients::{load_aws_config, S3BlobStore, SqsQueue};
use scanflow::config::ConsumerConfig;
use scanflow::services::{Consumer, CycleOutcome, ScanExecutor};
use scanflow::telemetry::init_tracing;

// M-MIMALLOC-APP: Use mimalloc as global allocator for improved performance.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("scanflow=info,consumer=info");

    tracing::info!("Scanner consumer starting");

    let config = match ConsumerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };
    tracing::info!(
        queue_url = %config.queue_url,
        bucket = %config.bucket,
        scan_tool = %config.scan_tool,
        "Configuration loaded"
    );

    let aws = load_aws_config().await;
    let queue = SqsQueue::new(&aws, &config.queue_url);
    let blobs = S3BlobStore::new(&aws, &config.bucket);
    let scanner = ScanExecutor::new(&config.scan_tool, config.deadlines.scan);
    let consumer = Consumer::new(&queue, &blobs, &scanner, &config.deadlines);

    let outcome = match consumer.run_cycle().await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "Cycle aborted");
            return Err(e.into());
        }
    };

    match &outcome {
        CycleOutcome::NoMessage => tracing::info!("No work item received, exiting"),
        CycleOutcome::ParseFailure { acknowledged, .. } => {
            tracing::warn!(acknowledged, "Malformed work item discarded, exiting")
        }
        CycleOutcome::Processed {
            target,
            key,
            acknowledged,
            ..
        } => tracing::info!(
            scan_target = %target,
            key = %key,
            acknowledged,
            "Message processing complete, exiting"
        ),
    }

    Ok(())
}
