//! model-eval CLI - Generative model scores and prediction ensembling

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// Score generative models and combine classifier predictions.
///
/// Scores are computed from precomputed activations stored as CSV, one row
/// per image.
#[derive(Parser)]
#[command(name = "model-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by the commands that read activation matrices.
#[derive(clap::Args)]
pub struct MatrixArgs {
    /// Input files have a header row
    #[arg(long)]
    headers: bool,

    /// Leading identifier columns to ignore
    #[arg(long, default_value_t = 0)]
    skip_columns: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Inception Score from classifier logits
    Inception {
        /// CSV of logits, one row per generated image
        #[arg(short, long)]
        logits: PathBuf,

        /// Number of chunks to run the classifier in
        #[arg(long, default_value_t = 1)]
        splits: usize,

        #[command(flatten)]
        matrix: MatrixArgs,

        /// Write a JSON score report here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fréchet distance between real and generated activations
    Frechet {
        /// CSV of activations for real images
        #[arg(long)]
        real: PathBuf,

        /// CSV of activations for generated images
        #[arg(long)]
        generated: PathBuf,

        /// Number of chunks to run the classifier in
        #[arg(long, default_value_t = 1)]
        splits: usize,

        #[command(flatten)]
        matrix: MatrixArgs,

        /// Write a JSON score report here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Combine prediction matrices from several models
    Ensemble {
        /// Prediction CSVs, one per model
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Combination rule (mean, gmean, log_mean)
        #[arg(short = 't', long = "type", default_value = "mean")]
        ensemble_type: String,

        #[command(flatten)]
        matrix: MatrixArgs,

        /// Output CSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show the 10-crop layout
    Crops {
        /// Crop edge length in pixels
        #[arg(long)]
        crop_size: usize,

        /// Image edge length in pixels
        #[arg(long)]
        image_size: usize,
    },

    /// Show the quasi-random TTA transforms for a prediction config
    Transforms {
        /// Number of transforms
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,

        /// Prediction config JSON with `aug_params`
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Color jitter magnitude
        #[arg(long, default_value_t = 0.0)]
        sigma: f64,
    },

    /// Download and extract the pretrained classifier graph
    FetchGraph {
        /// Tarball URL (defaults to the Inception v1 graph)
        #[arg(long)]
        url: Option<String>,

        /// Graph file inside the tarball
        #[arg(long)]
        file: Option<String>,

        /// Directory to cache the tarball in
        #[arg(long, env = "MODEL_EVAL_CACHE")]
        cache_dir: Option<PathBuf>,

        /// Where to write the extracted graph
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Inception { logits, splits, matrix, output } => {
            commands::inception::run(logits, splits, &matrix, output, cli.verbose)
        }
        Commands::Frechet { real, generated, splits, matrix, output } => {
            commands::frechet::run(real, generated, splits, &matrix, output, cli.verbose)
        }
        Commands::Ensemble { input, ensemble_type, matrix, output } => {
            commands::ensemble::run(input, &ensemble_type, &matrix, output, cli.verbose)
        }
        Commands::Crops { crop_size, image_size } => commands::crops::run(crop_size, image_size),
        Commands::Transforms { count, config, sigma } => {
            commands::transforms::run(count, config, sigma, cli.verbose)
        }
        Commands::FetchGraph { url, file, cache_dir, output } => {
            commands::fetch_graph::run(url, file, cache_dir, output, cli.verbose)
        }
    }
}

impl MatrixArgs {
    fn importer(&self) -> model_eval::MatrixImporter {
        model_eval::MatrixImporter::new()
            .has_headers(self.headers)
            .skip_columns(self.skip_columns)
    }
}
