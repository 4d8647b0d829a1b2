//! Boundary to the external tensor engine.
//!
//! model-eval never executes graphs itself. Callers plug in an engine by
//! implementing [`GraphExecutor`] (frozen classifier graphs) and
//! [`CheckpointBackend`] / [`Session`] (trained models with restorable
//! weights). Everything crossing the boundary is a [`Tensor`].

use std::path::Path;

use crate::classifier::FrozenGraph;
use crate::error::Result;
use crate::tensor::Tensor;

/// How the engine should execute classifier forward passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Number of mapped batch chunks the engine may run at once. Parallelism
    /// inside a single chunk is left to the engine.
    pub mapped_parallelism: usize,
    /// Whether gradients are tracked.
    pub back_prop: bool,
    /// Whether intermediate tensors may be swapped to host memory.
    pub swap_memory: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            mapped_parallelism: 1,
            back_prop: false,
            swap_memory: true,
        }
    }
}

/// Executes a frozen graph with one input binding and one fetched output.
pub trait GraphExecutor {
    /// Bind `input` to the tensor named `input_tensor`, run the graph and
    /// return the value of `output_tensor`.
    fn execute(
        &self,
        graph: &FrozenGraph,
        input_tensor: &str,
        input: &Tensor,
        output_tensor: &str,
        options: &ExecutionOptions,
    ) -> Result<Tensor>;
}

/// A restored model context. Dropping it releases the engine resources.
pub trait Session {
    /// Feed `input` into the tensor named `feed` and fetch `fetch`.
    fn run(&mut self, fetch: &str, feed: &str, input: &Tensor) -> Result<Tensor>;
}

/// Restores trained weights into a fresh [`Session`].
pub trait CheckpointBackend {
    /// Open a session with the weights at `weights_from` restored.
    ///
    /// Missing or unreadable weights are reported as
    /// [`Error::Restore`](crate::error::Error::Restore).
    fn restore(&self, weights_from: &Path) -> Result<Box<dyn Session>>;
}
