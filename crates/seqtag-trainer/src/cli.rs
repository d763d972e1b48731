//! Command-line front end for the `seqtag-train` binary.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use seqtag_core::{Encoders, MAX_WINDOW_SIDE, WindowConfig, load_corpus};
use tracing::{info, warn};

use crate::model::{ModelConfig, Topology};
use crate::trainer::{FitConfig, Trainer};

#[derive(Parser)]
#[command(name = "seqtag-train")]
#[command(about = "Train windowed LSTM taggers on CoNLL-style chunking corpora")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Window shape flags shared by every subcommand.
#[derive(clap::Args, Debug, Clone)]
pub struct WindowArgs {
    /// Tokens of left context
    #[arg(long, default_value_t = 2, value_parser = parse_window_side)]
    pub left: usize,

    /// Tokens of right context
    #[arg(long, default_value_t = 1, value_parser = parse_window_side)]
    pub right: usize,
}

fn parse_window_side(s: &str) -> Result<usize, String> {
    let side: usize = s.parse().map_err(|e| format!("{e}"))?;
    if side > MAX_WINDOW_SIDE {
        return Err(format!("at most {MAX_WINDOW_SIDE} tokens per side"));
    }
    Ok(side)
}

impl From<&WindowArgs> for WindowConfig {
    fn from(args: &WindowArgs) -> Self {
        WindowConfig::new(args.left, args.right)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fit a model and write its artifacts
    Train {
        /// Corpus file, one `token pos chunk` triple per line
        #[arg(short, long)]
        corpus: PathBuf,

        /// lstm, bidirectional-sum, bidirectional-concat, multi-input or multi-task
        #[arg(short, long, default_value = "multi-task")]
        topology: Topology,

        #[command(flatten)]
        window: WindowArgs,

        #[arg(long, default_value_t = 5)]
        epochs: usize,

        #[arg(long, default_value_t = 32)]
        batch_size: usize,

        #[arg(long, default_value_t = 64)]
        embedding_dim: usize,

        #[arg(long, default_value_t = 128)]
        hidden_dim: usize,

        #[arg(long, default_value_t = 1e-3)]
        learning_rate: f64,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Keep batch order fixed across epochs
        #[arg(long)]
        no_shuffle: bool,

        /// Share of the corpus (from the end) held out for evaluation
        #[arg(long, default_value_t = 0.1)]
        validation_fraction: f32,

        /// Keep only the N most frequent tokens
        #[arg(long)]
        max_vocab: Option<usize>,

        /// Directory for weights, config and encoders
        #[arg(short, long, default_value = "models/seqtag")]
        output: PathBuf,
    },
    /// Print the window and focus ids of each token as JSON lines
    Inspect {
        #[arg(short, long)]
        corpus: PathBuf,

        #[command(flatten)]
        window: WindowArgs,

        /// Stop after this many positions
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Serialize)]
struct InspectRow<'a> {
    position: usize,
    token: &'a str,
    window: &'a [u32],
    focus: u32,
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Train {
            corpus,
            topology,
            window,
            epochs,
            batch_size,
            embedding_dim,
            hidden_dim,
            learning_rate,
            seed,
            no_shuffle,
            validation_fraction,
            max_vocab,
            output,
        } => {
            let load = load_corpus(&corpus)
                .with_context(|| format!("failed to load corpus {}", corpus.display()))?;
            info!(
                records = load.len(),
                skipped = load.skipped(),
                "loaded {}",
                corpus.display()
            );

            let (train, valid) = load.split_at_fraction(validation_fraction);
            let encoders = Encoders::fit(train, WindowConfig::from(&window), max_vocab);
            let train_set = encoders.assemble(train)?;

            let model = ModelConfig::new()
                .with_topology(topology)
                .with_embedding_dim(embedding_dim)
                .with_hidden_dim(hidden_dim);
            let fit = FitConfig::new()
                .with_batch_size(batch_size)
                .with_epochs(epochs)
                .with_learning_rate(learning_rate)
                .with_seed(seed)
                .with_shuffle(!no_shuffle);

            let mut trainer = Trainer::new(model, &encoders)?;
            trainer.fit(&train_set, &fit)?;

            if valid.is_empty() {
                info!("no validation split");
            } else {
                match encoders.assemble(valid) {
                    Ok(valid_set) => {
                        let metrics = trainer.evaluate(&valid_set, fit.batch_size)?;
                        info!(
                            loss = metrics.loss,
                            pos_accuracy = metrics.pos_accuracy,
                            chunk_accuracy = ?metrics.chunk_accuracy,
                            "validation"
                        );
                    }
                    Err(e) => warn!("skipping validation: {e}"),
                }
            }

            trainer.save(&output, &encoders)?;
            Ok(())
        }
        Commands::Inspect {
            corpus,
            window,
            limit,
        } => {
            let load = load_corpus(&corpus)
                .with_context(|| format!("failed to load corpus {}", corpus.display()))?;
            let tokens = load.tokens();
            let encoders = Encoders::fit(&load.records, WindowConfig::from(&window), None);
            let features = encoders.features(&tokens)?;

            let limit = limit.unwrap_or(usize::MAX);
            let rows = tokens.iter().zip(features.windows()).enumerate().take(limit);
            for (position, (token, window)) in rows {
                let row = InspectRow {
                    position,
                    token,
                    window,
                    focus: features.focus[position],
                };
                println!("{}", serde_json::to_string(&row)?);
            }
            Ok(())
        }
    }
}
