//! Prismatic CLI - two-stage medical image classification
//!
//! Command-line front end for the router + expert classification pipeline.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::classify::ClassifyCommand;
use commands::domains::DomainsCommand;
use commands::verify::VerifyCommand;

#[derive(Parser)]
#[command(
    name = "prismatic",
    version,
    about = "Route medical images to a domain expert model and classify them",
    long_about = "A router model assigns each image to one of twelve imaging domains \
                  (blood cells, chest X-ray, dermatoscopy, retinal OCT, ...), then the \
                  expert model for that domain predicts the final class.\n\n\
                  Models are read from a directory holding stage1_router.onnx and one \
                  stage2_<domain>_final.onnx per domain.",
    after_help = "EXAMPLES:\n  \
                  # Classify images with models from ./models\n  \
                  prismatic classify scan.png lesion.jpg\n\n  \
                  # JSON output, custom model directory\n  \
                  prismatic classify --model-dir /srv/models --format json scan.png\n\n  \
                  # Check which experts are deployed\n  \
                  prismatic domains --model-dir /srv/models\n\n  \
                  # Load every model once and report failures\n  \
                  prismatic verify --config prismatic.yaml"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one or more image files
    Classify(ClassifyCommand),

    /// List the supported domains in router order
    Domains(DomainsCommand),

    /// Load the router and every expert, reporting degraded domains
    Verify(VerifyCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match &cli.command {
        Commands::Domains(_) => Level::WARN,
        _ => {
            if cli.verbose {
                Level::DEBUG
            } else {
                Level::INFO
            }
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Classify(cmd) => cmd.execute().await,
        Commands::Domains(cmd) => cmd.execute(),
        Commands::Verify(cmd) => cmd.execute().await,
    }
}
