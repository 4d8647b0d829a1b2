//! Running image batches through a frozen pretrained classifier.
//!
//! A [`ClassifierRunner`] binds a validated `[batch, height, width, channels]`
//! image tensor to the network's input, executes the frozen graph on the
//! caller's [`GraphExecutor`], and returns one activation row per image.
//!
//! ## Example
//!
//! ```rust,ignore
//! use model_eval::classifier::{ClassifierRunner, NetworkConfig, default_graph_provider};
//!
//! let config = NetworkConfig::default();
//! let provider = default_graph_provider(&config, None);
//! let runner = ClassifierRunner::new(config, Box::new(my_engine), None, Some(&provider))?;
//!
//! let logits = runner.logits(&images)?;
//! ```

pub mod provider;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use provider::{
    DiskGraphProvider, GraphProvider, ResourceGraphProvider, extract_from_tarball,
};
#[cfg(feature = "download")]
pub use provider::{TarballGraphProvider, default_graph_provider};

use crate::engine::{ExecutionOptions, GraphExecutor};
use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Tarball holding the pretrained Inception v1 frozen graph.
pub const INCEPTION_URL: &str =
    "http://download.tensorflow.org/models/frozen_inception_v1_2015_12_05.tar.gz";
/// Name of the frozen graph inside [`INCEPTION_URL`].
pub const INCEPTION_FROZEN_GRAPH: &str = "inceptionv1_for_inception_score.pb";
/// Input tensor of the default network.
pub const INCEPTION_INPUT: &str = "Mul:0";
/// Logits tensor of the default network.
pub const INCEPTION_OUTPUT: &str = "logits:0";
/// Final pooling layer of the default network.
pub const INCEPTION_FINAL_POOL: &str = "pool_3:0";
/// Square input size the default network requires.
pub const INCEPTION_DEFAULT_IMAGE_SIZE: usize = 299;

/// Where to find a pretrained classifier and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// URL of a gzip tarball containing the frozen graph.
    pub url: String,
    /// Name of the frozen graph file inside the tarball.
    pub frozen_graph: String,
    /// Name of the image input tensor.
    pub input_tensor: String,
    /// Name of the logits output tensor.
    pub logits_tensor: String,
    /// Name of the pooling-layer output tensor.
    pub pool_tensor: String,
    /// Required square input size in pixels.
    pub image_size: usize,
}

impl NetworkConfig {
    /// The Inception v1 network used for Inception Score and FID.
    #[must_use]
    pub fn inception_v1() -> Self {
        Self {
            url: INCEPTION_URL.to_string(),
            frozen_graph: INCEPTION_FROZEN_GRAPH.to_string(),
            input_tensor: INCEPTION_INPUT.to_string(),
            logits_tensor: INCEPTION_OUTPUT.to_string(),
            pool_tensor: INCEPTION_FINAL_POOL.to_string(),
            image_size: INCEPTION_DEFAULT_IMAGE_SIZE,
        }
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::inception_v1()
    }
}

/// Serialized frozen graph bytes, opaque to this crate.
#[derive(Clone, PartialEq, Eq)]
pub struct FrozenGraph {
    bytes: Vec<u8>,
}

impl FrozenGraph {
    /// Wrap graph bytes loaded from `source_name`.
    ///
    /// Fails if the artifact is empty.
    pub fn from_bytes(source_name: &str, bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::GraphLoad {
                source_name: source_name.to_string(),
                reason: "graph artifact is empty".to_string(),
            });
        }
        Ok(Self { bytes })
    }

    /// Raw serialized graph.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size of the serialized graph in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; empty graphs are rejected on construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for FrozenGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrozenGraph")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Check that `images` is `[batch, image_size, image_size, channels]`.
pub fn validate_images(images: &Tensor, image_size: usize) -> Result<()> {
    images.expect_rank("images", 4)?;
    let shape = images.shape();
    if shape[1] != image_size || shape[2] != image_size {
        return Err(Error::shape(
            "images",
            format!("[batch, {image_size}, {image_size}, channels]"),
            shape,
        ));
    }
    Ok(())
}

/// Run `images` through `graph` without validating them.
pub fn run_image_classifier(
    images: &Tensor,
    graph: &FrozenGraph,
    input_tensor: &str,
    output_tensor: &str,
    executor: &dyn GraphExecutor,
    options: &ExecutionOptions,
) -> Result<Tensor> {
    executor.execute(graph, input_tensor, images, output_tensor, options)
}

/// A frozen classifier ready to produce activations.
pub struct ClassifierRunner {
    config: NetworkConfig,
    graph: FrozenGraph,
    executor: Box<dyn GraphExecutor>,
    options: ExecutionOptions,
}

impl ClassifierRunner {
    /// Create a runner.
    ///
    /// An explicit `graph` is used as-is; otherwise `provider` is asked for
    /// one exactly once. Keep the runner around to avoid refetching.
    pub fn new(
        config: NetworkConfig,
        executor: Box<dyn GraphExecutor>,
        graph: Option<FrozenGraph>,
        provider: Option<&dyn GraphProvider>,
    ) -> Result<Self> {
        let graph = match (graph, provider) {
            (Some(graph), _) => graph,
            (None, Some(provider)) => {
                debug!("no graph supplied, fetching from default provider");
                provider.fetch()?
            }
            (None, None) => return Err(Error::MissingGraph),
        };
        debug!(bytes = graph.len(), "classifier graph resolved");
        Ok(Self {
            config,
            graph,
            executor,
            options: ExecutionOptions::default(),
        })
    }

    /// Override the execution options handed to the engine.
    #[must_use]
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Network configuration.
    #[must_use]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Validate `images`, execute up to `output_tensor`, flatten to `[N, D]`.
    pub fn run(&self, images: &Tensor, output_tensor: &str) -> Result<Tensor> {
        validate_images(images, self.config.image_size)?;
        let activations = run_image_classifier(
            images,
            &self.graph,
            &self.config.input_tensor,
            output_tensor,
            self.executor.as_ref(),
            &self.options,
        )?;
        activations.flatten_batch(output_tensor)
    }

    /// Logits of the network.
    pub fn logits(&self, images: &Tensor) -> Result<Tensor> {
        self.run(images, &self.config.logits_tensor)
    }

    /// Final pooling layer features of the network.
    pub fn pool_features(&self, images: &Tensor) -> Result<Tensor> {
        self.run(images, &self.config.pool_tensor)
    }
}

impl fmt::Debug for ClassifierRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierRunner")
            .field("config", &self.config)
            .field("graph", &self.graph)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
