//! Fréchet distance command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use model_eval::{ScoreReport, Tensor, frechet_classifier_distance};

use super::precomputed;
use crate::MatrixArgs;

fn load(path: &Path, matrix: &MatrixArgs, verbose: bool) -> Result<Tensor> {
    if verbose {
        eprintln!("Reading activations from: {}", path.display());
    }
    let activations = matrix
        .importer()
        .import(path)
        .with_context(|| format!("Failed to read activations from {}", path.display()))?;
    Ok(Tensor::from(activations.into_dyn()))
}

pub fn run(
    real: PathBuf,
    generated: PathBuf,
    splits: usize,
    matrix: &MatrixArgs,
    output: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let real = load(&real, matrix, verbose)?;
    let generated = load(&generated, matrix, verbose)?;

    if real.shape() != generated.shape() {
        bail!(
            "Real and generated activations must have the same shape, got {:?} and {:?}",
            real.shape(),
            generated.shape()
        );
    }

    let distance = frechet_classifier_distance(&real, &generated, precomputed, splits)
        .context("Failed to compute Fréchet distance")?;

    println!("Images per side:  {}", real.batch_len());
    println!("Features:         {}", real.shape()[1]);
    println!("Fréchet distance: {:.4}", distance.to_f64());

    if let Some(output_path) = output {
        ScoreReport::new("frechet_distance", distance, real.batch_len(), splits)
            .write_json(&output_path)
            .with_context(|| format!("Failed to write to {}", output_path.display()))?;
        println!("Saved to: {}", output_path.display());
    }

    Ok(())
}
