//! Quasi-random transform listing command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use model_eval::tta::{PredictionConfig, build_quasirandom_transforms};
use serde::Serialize;

#[derive(Serialize)]
struct TransformEntry {
    iteration: usize,
    matrix: [[f64; 3]; 3],
    color_vec: [f32; 3],
}

pub fn run(count: usize, config: Option<PathBuf>, sigma: f64, verbose: bool) -> Result<()> {
    let config = match config {
        Some(path) => {
            if verbose {
                eprintln!("Loading config from: {}", path.display());
            }
            PredictionConfig::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => PredictionConfig::default(),
    };

    let (transforms, color_vecs) = build_quasirandom_transforms(count, sigma, &config.aug_params);
    let entries: Vec<TransformEntry> = transforms
        .iter()
        .zip(color_vecs)
        .enumerate()
        .map(|(i, (t, color_vec))| TransformEntry {
            iteration: i + 1,
            matrix: *t.matrix(),
            color_vec,
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
