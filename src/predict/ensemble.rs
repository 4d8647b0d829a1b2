//! Combining predictions from independently trained models.

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Predictor, mean_stack, reduce_stack};
use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// How member predictions are combined along the model axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleType {
    /// Arithmetic mean.
    Mean,
    /// Geometric mean, `exp(mean(log x))`.
    Gmean,
    /// Mean of logs, with exact zeros replaced by 1 before the log.
    LogMean,
}

impl EnsembleType {
    /// Every ensemble type, in the order they are listed in help text.
    pub const ALL: [Self; 3] = [Self::Mean, Self::Gmean, Self::LogMean];

    /// Name used in configs and on the command line.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Gmean => "gmean",
            Self::LogMean => "log_mean",
        }
    }
}

impl fmt::Display for EnsembleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EnsembleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::UnknownEnsembleType {
                name: s.to_string(),
            })
    }
}

/// Combine equally shaped member predictions.
///
/// `LogMean` computes `mean(log(x + (x == 0)))`. A prediction of exactly 0
/// contributes `log 1 = 0`, while tiny nonzero values contribute large
/// negative logs.
pub fn combine(ensemble_type: EnsembleType, predictions: &[ArrayD<f32>]) -> Result<ArrayD<f32>> {
    match ensemble_type {
        EnsembleType::Mean => mean_stack(predictions),
        EnsembleType::Gmean => {
            Ok(reduce_stack(predictions, f64::ln)?.mapv(|v| v.exp() as f32))
        }
        EnsembleType::LogMean => {
            let guarded_log = |v: f64| (v + if v == 0.0 { 1.0 } else { 0.0 }).ln();
            Ok(reduce_stack(predictions, guarded_log)?.mapv(|v| v as f32))
        }
    }
}

/// Runs several predictors on the same input and combines their outputs.
pub struct EnsemblePredictor {
    predictors: Vec<Box<dyn Predictor>>,
}

impl EnsemblePredictor {
    /// Ensemble of `predictors`, run in order.
    #[must_use]
    pub fn new(predictors: Vec<Box<dyn Predictor>>) -> Self {
        Self { predictors }
    }

    /// Number of member predictors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.predictors.len()
    }

    /// Whether the ensemble has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predictors.is_empty()
    }

    /// Predict with every member, then combine with the ensemble type named
    /// `ensemble_type` (`mean`, `gmean` or `log_mean`).
    ///
    /// The name is checked before any member runs.
    pub fn predict(&mut self, x: &Tensor, ensemble_type: &str) -> Result<ArrayD<f32>> {
        let ensemble_type: EnsembleType = ensemble_type.parse()?;
        self.predict_with(x, ensemble_type)
    }

    /// [`predict`](Self::predict) with an already parsed ensemble type.
    pub fn predict_with(&mut self, x: &Tensor, ensemble_type: EnsembleType) -> Result<ArrayD<f32>> {
        let mut predictions = Vec::with_capacity(self.predictors.len());
        for predictor in &mut self.predictors {
            info!("Ensembler - running predictions using: {}", predictor.name());
            predictions.push(predictor.predict(x)?);
        }
        combine(ensemble_type, &predictions)
    }
}
