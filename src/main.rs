//! Command line entrypoint: train the artifact set, or classify messages with it.
//!
//! ```bash
//! # Train on synthetic data and write ./models
//! sms-spam train
//!
//! # Train on a message,label CSV
//! sms-spam train --dataset data/sms.csv --model-dir models
//!
//! # Classify arguments, or one message per stdin line
//! sms-spam predict "Click hxxp://free.redeem"
//! cat inbox.txt | sms-spam predict
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sms_spam_filtering::{ArtifactStore, Config, Predictor, train};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "sms-spam")]
#[command(about = "Train and run the SMS spam filter", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the trained artifacts
    #[arg(short, long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the vectorizer, classifier and anomaly detector, then save them
    Train {
        /// CSV with message,label columns; synthetic data is used when absent
        #[arg(short, long)]
        dataset: Option<PathBuf>,
    },
    /// Classify messages; reads stdin lines when no text is given
    Predict {
        text: Vec<String>,
    },
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(fmt::layer().json().with_writer(io::stderr)).init();
    } else {
        registry.with(fmt::layer().compact().with_writer(io::stderr)).init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }

    init_tracing(&config);

    match cli.command {
        Commands::Train { dataset } => {
            if dataset.is_some() {
                config.dataset = dataset;
            }
            let report =
                train::train_and_save(config).context("training failed, no artifacts written")?;
            info!(
                source = %report.source,
                samples = report.samples,
                vocabulary = report.vocabulary_size,
                accuracy = report.evaluation.accuracy(),
                "training complete"
            );
        }
        Commands::Predict { text } => {
            let store = ArtifactStore::new(config.model_dir.clone());
            let predictor = Predictor::load(&store, config.threshold)
                .with_context(|| format!("loading artifacts from {}", store.dir().display()))?;

            let stdout = io::stdout();
            let mut out = stdout.lock();
            if text.is_empty() {
                for line in io::stdin().lock().lines() {
                    let line = line.context("reading stdin")?;
                    let result = predictor.predict(Some(line.as_str()));
                    writeln!(out, "{}", serde_json::to_string(&result)?)?;
                }
            } else {
                for message in &text {
                    let result = predictor.predict(Some(message.as_str()));
                    writeln!(out, "{}", serde_json::to_string(&result)?)?;
                }
            }
        }
    }

    Ok(())
}
