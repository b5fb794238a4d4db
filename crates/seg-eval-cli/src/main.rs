//! seg-eval CLI - Segmentation mask scoring tool

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

/// Segmentation evaluation and mask scoring tool.
#[derive(Parser)]
#[command(name = "seg-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score predicted masks against ground-truth masks
    Score {
        /// Directory of ground-truth masks (PNG class-index grids)
        truth: PathBuf,

        /// Directory of predicted masks, paired by file name
        pred: PathBuf,

        /// Number of classes in the label space
        #[arg(short = 'c', long)]
        classes: usize,

        /// Write the full report as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Write a per-sample CSV summary
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Clamp out-of-range class values instead of rejecting them
        #[arg(long)]
        clip: bool,
    },

    /// Print statistics for a saved run report
    Summary {
        /// Run report JSON file
        input: PathBuf,

        /// Also print one row per sample
        #[arg(long)]
        detail: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Score {
            truth,
            pred,
            classes,
            json,
            csv,
            clip,
        } => commands::score::run(truth, pred, classes, json, csv, clip, cli.verbose),
        Commands::Summary { input, detail } => commands::summary::run(input, detail, cli.verbose),
    }
}
