//! Scan producer: submit a target file as one workflow run.
//!
//! Usage: `cargo run --bin producer -- --file targets.txt [--default-options "-sS -T4"]`
//!
//! Requires `STATE_MACHINE_ARN` (reads .env).

use std::path::PathBuf;

use clap::Parser;
use mimalloc::MiMalloc;
use scanflow::clients::{load_aws_config, StepFunctionsTrigger};
use scanflow::config::ProducerConfig;
use scanflow::services::produce_file;
use scanflow::telemetry::init_tracing;

// M-MIMALLOC-APP: Use mimalloc as global allocator for improved performance.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Producer CLI arguments
#[derive(Parser, Debug)]
#[command(name = "producer")]
#[command(about = "Submit a list of scan targets as one workflow run")]
struct Args {
    /// Path to file containing targets, one per line
    #[arg(long)]
    file: PathBuf,

    /// Scan options for lines that only name a target
    #[arg(long, default_value = "-sS", allow_hyphen_values = true)]
    default_options: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing("scanflow=info,producer=info");

    tracing::info!("Scanner producer starting");

    let config = match ProducerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };
    tracing::info!(
        state_machine_arn = %config.state_machine_arn,
        file = %args.file.display(),
        default_options = %args.default_options,
        "Configuration loaded"
    );

    let aws = load_aws_config().await;
    let trigger = StepFunctionsTrigger::new(&aws, &config.state_machine_arn);

    match produce_file(&args.file, &args.default_options, &trigger).await {
        Ok(report) => {
            tracing::info!(
                run = %report.run,
                submitted = report.submitted,
                "Successfully started scan"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to submit targets");
            Err(e.into())
        }
    }
}
