//! introute CLI — the main entry point.
//!
//! Commands:
//! - `init`     — Initialize config directory and default config.toml
//! - `resolve`  — Resolve one utterance against a template
//! - `template` — Inspect, validate, or import templates

use clap::{Parser, Subcommand};

mod commands;
mod notify;
mod wiring;

#[derive(Parser)]
#[command(
    name = "introute",
    about = "introute — tiered intent-resolution engine",
    version,
    author
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
    /// Initialize configuration directory
    Init,

    /// Resolve an utterance against a template
    Resolve {
        /// Template id to resolve against
        #[arg(short, long)]
        template: String,

        /// The caller utterance
        #[arg(short, long)]
        utterance: String,

        /// Skip the model tier (tiers 1 and 2 only)
        #[arg(long)]
        offline: bool,

        /// Upstream speech-to-text confidence in percent
        #[arg(long)]
        stt_confidence: Option<f32>,

        /// Reference to the call audio for re-transcription
        #[arg(long)]
        audio_ref: Option<String>,
    },

    /// Inspect, validate, or import templates
    Template {
        #[command(subcommand)]
        command: commands::template::TemplateCommand,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Resolve {
            template,
            utterance,
            offline,
            stt_confidence,
            audio_ref,
        } => {
            commands::resolve::run(template, utterance, offline, stt_confidence, audio_ref).await?
        }
        Commands::Template { command } => commands::template::run(command).await?,
    }

    Ok(())
}
