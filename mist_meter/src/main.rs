// One inspection of the current webcam frame per invocation. Scheduling is
// left to cron or a systemd timer.

use anyhow::{Context, bail};
use clap::Parser;
use tracing::Level;

use mist_meter::{MeterConfig, ProductionPipeline};

#[derive(Debug, Parser)]
#[command(name = "mist_meter", version, about = "Detects fog in a webcam frame and raises alerts")]
struct Cli {
    /// Log every stage at debug level.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_target(false)
        .init();

    let config = MeterConfig::load().context("loading configuration")?;
    let pipeline = ProductionPipeline::from_config(config)?;
    let outcome = pipeline.run().await.context("mist_meter run failed")?;

    if let Some(e) = outcome.classifier_error {
        bail!("run completed on the threshold rule only: {e}");
    }
    Ok(())
}
