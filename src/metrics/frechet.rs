//! Fréchet distance between Gaussians fitted to classifier activations.
//!
//! ```text
//! d² = ||m - m_v||² + trace(Σ + Σ_v) - 2 trace(sqrt(Σ Σ_v))
//! ```
//!
//! The estimator is biased for small samples. Compare models only at equal
//! sample sizes for real and generated images.

use ndarray::{Array1, Array2, ArrayView2, Axis, Ix2};
use tracing::debug;

use super::linalg::{to_dmatrix, trace_sqrt_product};
use super::map_chunks;
use crate::classifier::ClassifierRunner;
use crate::error::{Error, Result};
use crate::tensor::{Scalar, Tensor};

/// Mean and unbiased covariance of a set of activations.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSummary {
    mean: Array1<f64>,
    covariance: Array2<f64>,
    count: usize,
}

impl DistributionSummary {
    /// Summarize `[N, D]` activations. Requires `N >= 2`.
    pub fn from_activations(activations: ArrayView2<'_, f64>) -> Result<Self> {
        let (count, _) = activations.dim();
        if count < 2 {
            return Err(Error::shape(
                "activations",
                "at least 2 rows for an unbiased covariance",
                activations.shape(),
            ));
        }

        let mean = activations
            .mean_axis(Axis(0))
            .ok_or_else(|| Error::shape("activations", "at least one row", activations.shape()))?;
        let centered = &activations - &mean;
        let covariance = centered.t().dot(&centered) / (count - 1) as f64;

        Ok(Self {
            mean,
            covariance,
            count,
        })
    }

    /// Per-feature mean.
    #[must_use]
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// `[D, D]` covariance, normalized by `N - 1`.
    #[must_use]
    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    /// Number of activation rows summarized.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Feature dimension.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Fréchet distance to `other`.
    pub fn frechet_distance(&self, other: &Self) -> Result<f64> {
        if self.dim() != other.dim() {
            return Err(Error::shape(
                "activations",
                format!("{} features on both sides", self.dim()),
                (self.dim(), other.dim()),
            ));
        }

        let sigma = to_dmatrix(self.covariance.view());
        let sigma_v = to_dmatrix(other.covariance.view());
        let sqrt_trace_component = trace_sqrt_product(&sigma, &sigma_v)?;
        let trace = sigma.trace() + sigma_v.trace() - 2.0 * sqrt_trace_component;

        let mean_diff = &self.mean - &other.mean;
        let mean_term = mean_diff.dot(&mean_diff);

        debug!(trace, mean_term, "frechet components");
        Ok(trace + mean_term)
    }
}

/// Fréchet distance between `real` and `generated` under `classifier_fn`.
///
/// Both batches are split into `num_batches` chunks, which must all have the
/// same shape. The real chunks run first, then the generated ones, and the
/// activations are separated again by position. `classifier_fn` must return
/// `[chunk, features]` floating point activations.
pub fn frechet_classifier_distance<F>(
    real: &Tensor,
    generated: &Tensor,
    mut classifier_fn: F,
    num_batches: usize,
) -> Result<Scalar>
where
    F: FnMut(&Tensor) -> Result<Tensor>,
{
    let mut chunks = real.split("real_images", num_batches)?;
    chunks.extend(generated.split("generated_images", num_batches)?);
    if let Some(first) = chunks.first()
        && let Some(bad) = chunks.iter().find(|c| c.shape() != first.shape())
    {
        return Err(Error::shape(
            "generated_images",
            format!("chunks of shape {:?} like real_images", first.shape()),
            bad.shape(),
        ));
    }

    let mut activations = map_chunks(&chunks, &mut classifier_fn)?;
    let generated_activations = activations.split_off(num_batches);
    let real_a = Tensor::concat(&activations)?;
    let gen_a = Tensor::concat(&generated_activations)?;
    for (name, a) in [("real_activations", &real_a), ("generated_activations", &gen_a)] {
        a.expect_rank(name, 2)?;
        a.expect_floating(name)?;
    }
    let dtype = real_a.dtype();

    let real_a = real_a.to_f64().into_dimensionality::<Ix2>()?;
    let gen_a = gen_a.to_f64().into_dimensionality::<Ix2>()?;
    let real_summary = DistributionSummary::from_activations(real_a.view())?;
    let gen_summary = DistributionSummary::from_activations(gen_a.view())?;

    Ok(Scalar::from_f64(
        real_summary.frechet_distance(&gen_summary)?,
        dtype,
    ))
}

/// Fréchet Inception Distance: [`frechet_classifier_distance`] on the
/// runner's pooling layer.
pub fn frechet_inception_distance(
    real: &Tensor,
    generated: &Tensor,
    runner: &ClassifierRunner,
    num_batches: usize,
) -> Result<Scalar> {
    frechet_classifier_distance(
        real,
        generated,
        |chunk| runner.pool_features(chunk),
        num_batches,
    )
}
