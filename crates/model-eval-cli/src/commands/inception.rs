//! Inception Score command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use model_eval::{ScoreReport, Tensor, classifier_score};
use tracing::debug;

use super::precomputed;
use crate::MatrixArgs;

pub fn run(
    logits: PathBuf,
    splits: usize,
    matrix: &MatrixArgs,
    output: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    if verbose {
        eprintln!("Reading logits from: {}", logits.display());
    }

    let activations = matrix
        .importer()
        .import(&logits)
        .with_context(|| format!("Failed to read logits from {}", logits.display()))?;
    let (rows, classes) = activations.dim();
    debug!(rows, classes, splits, "logits loaded");

    let score = classifier_score(&Tensor::from(activations.into_dyn()), precomputed, splits)
        .context("Failed to compute Inception Score")?;

    println!("Images:          {}", rows);
    println!("Classes:         {}", classes);
    println!("Inception Score: {:.4}", score.to_f64());

    if let Some(output_path) = output {
        ScoreReport::new("inception_score", score, rows, splits)
            .write_json(&output_path)
            .with_context(|| format!("Failed to write to {}", output_path.display()))?;
        println!("Saved to: {}", output_path.display());
    }

    Ok(())
}
