//! Strategies for obtaining a frozen graph artifact.
//!
//! The caller chooses where the pretrained network comes from: a file on
//! disk, a resource compiled into the binary, or a gzip tarball on the web
//! that is downloaded into a cache directory on first use.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
#[cfg(feature = "download")]
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::debug;

use super::FrozenGraph;
use crate::error::{Error, Result};

/// Produces a frozen graph artifact.
pub trait GraphProvider {
    /// Fetch the graph bytes.
    fn fetch(&self) -> Result<FrozenGraph>;
}

/// Reads a frozen graph from a local file.
#[derive(Debug, Clone)]
pub struct DiskGraphProvider {
    path: PathBuf,
}

impl DiskGraphProvider {
    /// Provider for the graph file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GraphProvider for DiskGraphProvider {
    fn fetch(&self) -> Result<FrozenGraph> {
        let source_name = self.path.display().to_string();
        let bytes = std::fs::read(&self.path).map_err(|e| Error::GraphLoad {
            source_name: source_name.clone(),
            reason: e.to_string(),
        })?;
        FrozenGraph::from_bytes(&source_name, bytes)
    }
}

/// Resources bundled into the binary, typically via `include_bytes!`.
pub type ResourceBundle = &'static [(&'static str, &'static [u8])];

/// Looks a frozen graph up by name in a [`ResourceBundle`].
#[derive(Debug, Clone)]
pub struct ResourceGraphProvider {
    bundle: ResourceBundle,
    name: String,
}

impl ResourceGraphProvider {
    /// Provider for the resource called `name`.
    #[must_use]
    pub fn new(bundle: ResourceBundle, name: impl Into<String>) -> Self {
        Self {
            bundle,
            name: name.into(),
        }
    }
}

impl GraphProvider for ResourceGraphProvider {
    fn fetch(&self) -> Result<FrozenGraph> {
        let (_, bytes) = self
            .bundle
            .iter()
            .find(|(name, _)| *name == self.name)
            .ok_or_else(|| Error::GraphLoad {
                source_name: self.name.clone(),
                reason: "no such bundled resource".to_string(),
            })?;
        FrozenGraph::from_bytes(&self.name, bytes.to_vec())
    }
}

/// Extract the member called `filename` from a gzip-compressed tarball.
pub fn extract_from_tarball<R: Read>(reader: R, filename: &str) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let wanted = Path::new(filename);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let matches = {
            let path = entry.path()?;
            let path: &Path = path.as_ref();
            path.strip_prefix("./").unwrap_or(path) == wanted
        };
        if matches {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            return Ok(bytes);
        }
    }

    Err(Error::GraphLoad {
        source_name: filename.to_string(),
        reason: "not found in tarball".to_string(),
    })
}

/// Downloads a gzip tarball and extracts the named frozen graph.
///
/// The tarball is kept in `cache_dir`, so only the first fetch touches the
/// network. Download progress is written to stdout.
#[cfg(feature = "download")]
#[derive(Debug, Clone)]
pub struct TarballGraphProvider {
    url: String,
    filename: String,
    cache_dir: PathBuf,
}

#[cfg(feature = "download")]
impl TarballGraphProvider {
    /// Provider for `filename` inside the tarball at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, filename: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Location the tarball is cached at.
    #[must_use]
    pub fn cached_path(&self) -> PathBuf {
        let name = self
            .url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("graph.tar.gz");
        self.cache_dir.join(name)
    }

    fn download(&self) -> Result<PathBuf> {
        use std::io::{BufWriter, Write};

        let target = self.cached_path();
        if target.exists() {
            debug!(path = %target.display(), "using cached graph tarball");
            return Ok(target);
        }
        std::fs::create_dir_all(&self.cache_dir)?;

        let download_error = |reason: String| Error::Download {
            url: self.url.clone(),
            reason,
        };
        let response =
            reqwest::blocking::get(&self.url).map_err(|e| download_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(download_error(format!("HTTP {}", response.status())));
        }

        let pb = download_progress(&self.url, response.content_length())?;
        let partial = target.with_extension("part");
        let mut file = BufWriter::new(std::fs::File::create(&partial)?);
        copy_with_progress(response, &mut file, &pb)?;
        file.flush()?;
        drop(file);

        std::fs::rename(&partial, &target)?;
        Ok(target)
    }
}

/// Byte progress bar for a download of `total` bytes, drawn on stdout.
#[cfg(feature = "download")]
fn download_progress(url: &str, total: Option<u64>) -> Result<ProgressBar> {
    let style = ProgressStyle::default_bar()
        .template(">> Downloading {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .map_err(|e| Error::Download {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .progress_chars("#>-");
    let pb = ProgressBar::with_draw_target(total, ProgressDrawTarget::stdout());
    pb.set_style(style);
    pb.set_message(url.to_string());
    Ok(pb)
}

#[cfg(feature = "download")]
fn copy_with_progress<R: Read, W: std::io::Write>(
    reader: R,
    writer: &mut W,
    pb: &ProgressBar,
) -> Result<u64> {
    let copied = std::io::copy(&mut pb.wrap_read(reader), writer)?;
    pb.finish();
    Ok(copied)
}

#[cfg(feature = "download")]
impl GraphProvider for TarballGraphProvider {
    fn fetch(&self) -> Result<FrozenGraph> {
        let tarball = self.download()?;
        let file = std::fs::File::open(&tarball)?;
        let bytes = extract_from_tarball(std::io::BufReader::new(file), &self.filename)?;
        FrozenGraph::from_bytes(&format!("{}:{}", self.url, self.filename), bytes)
    }
}

/// Tarball provider for the network described by `config`.
///
/// Caches under `cache_dir`, or `<tmp>/model-eval` when `None`.
#[cfg(feature = "download")]
#[must_use]
pub fn default_graph_provider(
    config: &super::NetworkConfig,
    cache_dir: Option<PathBuf>,
) -> TarballGraphProvider {
    let cache_dir = cache_dir.unwrap_or_else(|| std::env::temp_dir().join("model-eval"));
    TarballGraphProvider::new(&config.url, &config.frozen_graph, cache_dir)
}
