//! Quasi-random test-time augmentation.

use ndarray::ArrayD;
use tracing::info;

use super::{OneCropPredictor, Predictor, mean_stack};
use crate::error::{Error, Result};
use crate::tensor::Tensor;
use crate::tta::{AugmentationParams, PredictionConfig, build_quasirandom_transforms, verify_args};

/// Standardizer parameters the color jitter understands.
const SUPPORTED_DA_PARAMS: &[&str] = &["sigma"];

/// Averages predictions over deterministic quasi-random augmentations.
pub struct QuasiPredictor {
    predictor: OneCropPredictor,
    aug_params: AugmentationParams,
    number_of_transforms: usize,
}

impl QuasiPredictor {
    /// Wrap `predictor`, averaging over `number_of_transforms` transforms
    /// drawn from `config.aug_params`.
    pub fn new(
        predictor: OneCropPredictor,
        config: &PredictionConfig,
        number_of_transforms: usize,
    ) -> Result<Self> {
        if number_of_transforms == 0 {
            return Err(Error::Config(
                "QuasiPredictor needs at least one transform".to_string(),
            ));
        }
        Ok(Self {
            predictor,
            aug_params: config.aug_params.clone(),
            number_of_transforms,
        })
    }

    /// Forward passes per prediction.
    #[must_use]
    pub fn number_of_transforms(&self) -> usize {
        self.number_of_transforms
    }
}

impl Predictor for QuasiPredictor {
    fn predict(&mut self, x: &Tensor) -> Result<ArrayD<f32>> {
        let da_params = self.predictor.standardizer_mut().da_processing_params();
        verify_args(
            &da_params,
            SUPPORTED_DA_PARAMS,
            "QuasiPredictor > standardizer does unknown da with param(s):",
        )?;
        let color_sigma = da_params.get("sigma").copied().unwrap_or(0.0);
        let (transforms, color_vecs) =
            build_quasirandom_transforms(self.number_of_transforms, color_sigma, &self.aug_params);

        let mut session = self.predictor.open_session()?;
        let mut predictions = Vec::with_capacity(transforms.len());
        for (i, (transform, color_vec)) in transforms.iter().zip(color_vecs).enumerate() {
            info!("Quasi-random tta iteration: {}", i + 1);
            self.predictor.standardizer_mut().set_tta_args(color_vec);
            predictions.push(self.predictor.predict_in_session(
                &mut session,
                x,
                Some(transform),
                None,
            )?);
        }
        mean_stack(&predictions)
    }

    fn name(&self) -> String {
        format!(
            "QuasiPredictor({}, {} transforms)",
            self.predictor.weights_from().display(),
            self.number_of_transforms
        )
    }
}
