//! Quality scores for generative models, computed from classifier activations.
//!
//! - **Classifier / Inception Score**: `exp(E[KL(p(y|x) || p(y))])`, higher is
//!   better. Measures how confidently and how diversely a classifier labels
//!   the generated images.
//! - **Fréchet distance**: distance between Gaussians fitted to real and
//!   generated activations, lower is better, 0 for identical statistics.
//!
//! Both estimators split the input into `num_batches` equal chunks, run the
//! classifier chunk by chunk in order, and do all statistics in `f64`
//! before casting the score back to the activations' precision.
//!
//! ## Example
//!
//! ```rust,ignore
//! use model_eval::metrics::{inception_score, frechet_inception_distance};
//!
//! let is = inception_score(&generated, &runner, 4)?;
//! let fid = frechet_inception_distance(&real, &generated, &runner, 4)?;
//! println!("IS {is}, FID {fid}");
//! ```

pub mod frechet;
pub mod inception;
pub mod linalg;

use tracing::debug;

pub use frechet::{
    DistributionSummary, frechet_classifier_distance, frechet_inception_distance,
};
pub use inception::{classifier_score, inception_score, kl_divergence};
pub use linalg::{SQRT_EPS, sqrt_symmetric, trace_sqrt_product};

use crate::error::Result;
use crate::tensor::Tensor;

/// Run `classifier_fn` over `chunks` one at a time, keeping their order.
pub(crate) fn map_chunks<F>(chunks: &[Tensor], classifier_fn: &mut F) -> Result<Vec<Tensor>>
where
    F: FnMut(&Tensor) -> Result<Tensor>,
{
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            debug!(chunk = i, batch = chunk.batch_len(), "running classifier");
            classifier_fn(chunk)
        })
        .collect()
}
