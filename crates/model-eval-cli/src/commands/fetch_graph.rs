//! Frozen graph download command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use model_eval::classifier::{GraphProvider, TarballGraphProvider, default_graph_provider};
use model_eval::NetworkConfig;

pub fn run(
    url: Option<String>,
    file: Option<String>,
    cache_dir: Option<PathBuf>,
    output: PathBuf,
    verbose: bool,
) -> Result<()> {
    let config = NetworkConfig::default();
    let provider = match (url, file) {
        (None, None) => default_graph_provider(&config, cache_dir),
        (url, file) => {
            let cache_dir = cache_dir.unwrap_or_else(|| std::env::temp_dir().join("model-eval"));
            TarballGraphProvider::new(
                url.unwrap_or(config.url),
                file.unwrap_or(config.frozen_graph),
                cache_dir,
            )
        }
    };

    if verbose {
        eprintln!("Cache: {}", provider.cached_path().display());
    }

    let graph = provider.fetch().context("Failed to fetch frozen graph")?;
    std::fs::write(&output, graph.as_bytes())
        .with_context(|| format!("Failed to write to {}", output.display()))?;

    println!("Wrote {} bytes to: {}", graph.len(), output.display());
    Ok(())
}
