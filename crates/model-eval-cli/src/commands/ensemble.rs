//! Ensemble command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use model_eval::{EnsembleType, predict::combine, write_matrix_csv};
use ndarray::Ix2;

use crate::MatrixArgs;

pub fn run(
    inputs: Vec<PathBuf>,
    ensemble_type: &str,
    matrix: &MatrixArgs,
    output: PathBuf,
    verbose: bool,
) -> Result<()> {
    let ensemble_type: EnsembleType = ensemble_type.parse()?;

    let mut predictions = Vec::with_capacity(inputs.len());
    for path in &inputs {
        if verbose {
            eprintln!("Reading predictions from: {}", path.display());
        }
        let m = matrix
            .importer()
            .import(path)
            .with_context(|| format!("Failed to read predictions from {}", path.display()))?;
        predictions.push(m.mapv(|v| v as f32).into_dyn());
    }

    let combined = combine(ensemble_type, &predictions)
        .with_context(|| format!("Failed to combine {} prediction files", inputs.len()))?
        .into_dimensionality::<Ix2>()?;

    write_matrix_csv(&output, combined.view(), None)
        .with_context(|| format!("Failed to write to {}", output.display()))?;

    println!(
        "Combined {} models with {}: {} rows x {} columns",
        inputs.len(),
        ensemble_type,
        combined.nrows(),
        combined.ncols()
    );
    println!("Saved to: {}", output.display());

    Ok(())
}
