//! Classifier score: the Inception Score generalized to any classifier.
//!
//! `exp(mean_i KL(p_i || q))` where `p_i` is the softmax of image `i`'s
//! logits and `q` is the mean of all `p_i`. Because the logits of every chunk
//! are concatenated before any statistic is taken, the score does not depend
//! on how many chunks the classifier was run in.

use ndarray::{Array1, Array2, ArrayView2, Axis, Ix1, Ix2};
use tracing::debug;

use super::map_chunks;
use crate::classifier::ClassifierRunner;
use crate::error::{Error, Result};
use crate::tensor::{Scalar, Tensor};

/// Per-row KL divergence `KL(p_i || q)`.
///
/// Uses `log_softmax(p_logits)` in place of `log(p)`:
///
/// ```text
/// KL(p || q) = sum_j p_j * (log p_j - log q_j)
///            = sum_j p_j * (log_softmax(p_logits)_j - log q_j)
/// ```
///
/// `p` and `p_logits` must be rank 2 and `q` rank 1, all floating point.
pub fn kl_divergence(p: &Tensor, p_logits: &Tensor, q: &Tensor) -> Result<Array1<f64>> {
    for (name, tensor) in [("p", p), ("p_logits", p_logits), ("q", q)] {
        tensor.expect_floating(name)?;
    }
    p.expect_rank("p", 2)?;
    p_logits.expect_rank("p_logits", 2)?;
    q.expect_rank("q", 1)?;

    let p = p.to_f64().into_dimensionality::<Ix2>()?;
    let logits = p_logits.to_f64().into_dimensionality::<Ix2>()?;
    let q = q.to_f64().into_dimensionality::<Ix1>()?;
    if logits.dim() != p.dim() {
        return Err(Error::shape(
            "p_logits",
            format!("{:?} like p", p.shape()),
            logits.shape(),
        ));
    }
    if q.len() != p.ncols() {
        return Err(Error::shape(
            "q",
            format!("[{}]", p.ncols()),
            q.shape(),
        ));
    }

    let log_q = q.mapv(f64::ln);
    let log_p = log_softmax(logits.view());
    Ok((&p * &(log_p - &log_q)).sum_axis(Axis(1)))
}

/// Row-wise `log_softmax`, shifted by the row maximum.
fn log_softmax(logits: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut out = logits.to_owned();
    for mut row in out.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        let log_sum = row.iter().map(|&v| (v - max).exp()).sum::<f64>().ln();
        row.mapv_inplace(|v| v - max - log_sum);
    }
    out
}

/// Classifier score of `images` under `classifier_fn`.
///
/// `images` is split into `num_batches` equal chunks (the batch size must be
/// divisible by it). `classifier_fn` maps a chunk to `[chunk, classes]`
/// floating point logits. The score is computed in `f64` and returned in the
/// logits' precision.
pub fn classifier_score<F>(images: &Tensor, mut classifier_fn: F, num_batches: usize) -> Result<Scalar>
where
    F: FnMut(&Tensor) -> Result<Tensor>,
{
    let chunks = images.split("images", num_batches)?;
    let logits = Tensor::concat(&map_chunks(&chunks, &mut classifier_fn)?)?;
    logits.expect_rank("logits", 2)?;
    logits.expect_floating("logits")?;
    let dtype = logits.dtype();

    let logits = logits.to_f64().into_dimensionality::<Ix2>()?;
    let p = log_softmax(logits.view()).mapv(f64::exp);
    let q = p
        .mean_axis(Axis(0))
        .ok_or_else(|| Error::shape("logits", "at least one row", logits.shape()))?;

    let kl = kl_divergence(
        &Tensor::from(p.into_dyn()),
        &Tensor::from(logits.into_dyn()),
        &Tensor::from(q.into_dyn()),
    )?;
    let log_score = kl.mean().unwrap_or(0.0);
    debug!(examples = kl.len(), log_score, "classifier score");

    Ok(Scalar::from_f64(log_score.exp(), dtype))
}

/// Inception Score: [`classifier_score`] on the runner's logits output.
pub fn inception_score(images: &Tensor, runner: &ClassifierRunner, num_batches: usize) -> Result<Scalar> {
    classifier_score(images, |chunk| runner.logits(chunk), num_batches)
}
