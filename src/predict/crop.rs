//! Deterministic multi-crop prediction.

use ndarray::ArrayD;
use tracing::info;

use super::{OneCropPredictor, Predictor, mean_stack};
use crate::error::{Error, Result};
use crate::tensor::Tensor;
use crate::tta::{CropBox, ten_crop_boxes};

/// Averages predictions over the 10-crop layout, or runs a single pass when
/// one crop is requested.
pub struct CropPredictor {
    predictor: OneCropPredictor,
    crop_boxes: Vec<CropBox>,
    number_of_crops: usize,
}

impl CropPredictor {
    /// Wrap `predictor`. `crop_size` and `im_size` are square edge lengths.
    pub fn new(
        predictor: OneCropPredictor,
        crop_size: usize,
        im_size: usize,
        number_of_crops: usize,
    ) -> Result<Self> {
        let crop_boxes = match number_of_crops {
            0 => {
                return Err(Error::Config(
                    "CropPredictor needs at least one crop".to_string(),
                ));
            }
            1 => Vec::new(),
            _ => ten_crop_boxes(crop_size, im_size)?,
        };
        Ok(Self {
            predictor,
            crop_boxes,
            number_of_crops,
        })
    }

    /// Crop boxes predicted on, empty for a single uncropped pass.
    #[must_use]
    pub fn crop_boxes(&self) -> &[CropBox] {
        &self.crop_boxes
    }
}

impl Predictor for CropPredictor {
    fn predict(&mut self, x: &Tensor) -> Result<ArrayD<f32>> {
        let mut session = self.predictor.open_session()?;
        if self.crop_boxes.is_empty() {
            return self.predictor.predict_in_session(&mut session, x, None, None);
        }

        let mut predictions = Vec::with_capacity(self.crop_boxes.len());
        for (i, crop_bbox) in self.crop_boxes.iter().enumerate() {
            info!("Crop-deterministic iteration: {}", i + 1);
            predictions.push(self.predictor.predict_in_session(
                &mut session,
                x,
                None,
                Some(crop_bbox),
            )?);
        }
        mean_stack(&predictions)
    }

    fn name(&self) -> String {
        format!(
            "CropPredictor({}, {} crops)",
            self.predictor.weights_from().display(),
            self.number_of_crops
        )
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::predict::tests::{CallLog, fake_predictor, input};

    #[test]
    fn test_single_crop_is_one_pass() {
        let calls = Rc::new(CallLog::default());
        let direct = fake_predictor(&calls, 1.0, false).predict(&input()).unwrap();

        let mut crop = CropPredictor::new(fake_predictor(&calls, 1.0, false), 224, 256, 1).unwrap();
        assert!(crop.crop_boxes().is_empty());
        assert_eq!(crop.predict(&input()).unwrap(), direct);
    }

    #[test]
    fn test_ten_crops_averaged() {
        let calls = Rc::new(CallLog::default());
        let mut crop = CropPredictor::new(fake_predictor(&calls, 0.0, false), 224, 256, 10).unwrap();
        let out = crop.predict(&input()).unwrap();

        // Fake iterator shifts by the crop's left edge: lefts are
        // 0, 32, 0, 32, 16 twice over, mean 16.
        let expected = input().to_f32().mapv(|v| v + 16.0);
        assert_eq!(out, expected);
        assert_eq!(calls.restored.get(), 1);
        assert_eq!(calls.runs.get(), 10 * 3);
    }

    #[test]
    fn test_zero_crops_rejected() {
        let calls = Rc::new(CallLog::default());
        let result = CropPredictor::new(fake_predictor(&calls, 0.0, false), 224, 256, 0);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_crop_larger_than_image_rejected() {
        let calls = Rc::new(CallLog::default());
        let result = CropPredictor::new(fake_predictor(&calls, 0.0, false), 300, 256, 10);
        assert!(result.is_err());
    }
}
