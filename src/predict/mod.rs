//! Predictions from trained models.
//!
//! Every strategy reduces to "run N forward passes with N different input
//! transforms, then average":
//!
//! - [`OneCropPredictor`]: one pass, optionally with a transform or crop box.
//! - [`QuasiPredictor`]: one pass per quasi-random TTA transform.
//! - [`CropPredictor`]: one pass, or one pass per box of the 10-crop layout.
//! - [`EnsemblePredictor`]: combines several independently trained models.
//!
//! The model weights are restored into a [`Session`](crate::engine::Session)
//! at the start of each `predict` call and released when it returns, also on
//! failure.
//!
//! ## Example
//!
//! ```rust,ignore
//! use model_eval::predict::{EnsemblePredictor, OneCropPredictor, QuasiPredictor};
//!
//! let one = OneCropPredictor::new(model_fn, backend, "weights/model-90", iterator)?;
//! let quasi = QuasiPredictor::new(one, &config, 10)?;
//! let mut ensemble = EnsemblePredictor::new(vec![Box::new(quasi), Box::new(other)]);
//! let probs = ensemble.predict(&images, "mean")?;
//! ```

pub mod crop;
pub mod ensemble;
pub mod one_crop;
pub mod quasi;

use std::collections::BTreeMap;

use ndarray::ArrayD;

pub use crop::CropPredictor;
pub use ensemble::{EnsemblePredictor, EnsembleType, combine};
pub use one_crop::OneCropPredictor;
pub use quasi::QuasiPredictor;

use crate::error::{Error, Result};
use crate::tensor::Tensor;
use crate::tta::{AffineTransform, CropBox};

/// Named tensors of a model built for inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Input placeholder fed with each batch.
    pub inputs: String,
    /// Output fetched as the predictions.
    pub predictions: String,
}

/// One batch from a [`PredictionIterator`]: inputs and optional labels.
pub type Batch = (Tensor, Option<Tensor>);

/// Batches produced on demand by a [`PredictionIterator`].
pub type BatchIter<'a> = Box<dyn Iterator<Item = Result<Batch>> + 'a>;

/// Data standardization applied by a [`PredictionIterator`].
pub trait Standardizer {
    /// Augmentation parameters the standardizer applies, by name.
    fn da_processing_params(&self) -> BTreeMap<String, f64>;

    /// Set the color jitter for the following passes.
    fn set_tta_args(&mut self, color_vec: [f32; 3]);
}

/// Splits and augments prediction input into batches.
pub trait PredictionIterator {
    /// Batches for `x`, in order, with `transform` or `crop_bbox` applied.
    ///
    /// Each batch is built when the consumer asks for it, so only one
    /// augmented batch needs to be alive at a time.
    fn batches<'a>(
        &'a mut self,
        x: &'a Tensor,
        transform: Option<&'a AffineTransform>,
        crop_bbox: Option<&'a CropBox>,
    ) -> BatchIter<'a>;

    /// Standardizer applied to every batch.
    fn standardizer_mut(&mut self) -> &mut dyn Standardizer;
}

/// A prediction strategy.
pub trait Predictor {
    /// Predictions for `x`, one row per input, in input order.
    fn predict(&mut self, x: &Tensor) -> Result<ArrayD<f32>>;

    /// Human readable description used in logs.
    fn name(&self) -> String;
}

/// Elementwise mean of `f(x)` over equally shaped arrays, accumulated in `f64`.
pub(crate) fn reduce_stack(
    predictions: &[ArrayD<f32>],
    f: impl Fn(f64) -> f64,
) -> Result<ArrayD<f64>> {
    let Some(first) = predictions.first() else {
        return Err(Error::Config("no predictions to combine".to_string()));
    };
    let mut acc = first.mapv(|v| f(f64::from(v)));
    for (i, p) in predictions.iter().enumerate().skip(1) {
        if p.shape() != first.shape() {
            return Err(Error::shape(
                format!("predictions[{i}]"),
                format!("{:?} like predictions[0]", first.shape()),
                p.shape(),
            ));
        }
        acc.zip_mut_with(p, |a, &v| *a += f(f64::from(v)));
    }
    let n = predictions.len() as f64;
    acc.mapv_inplace(|v| v / n);
    Ok(acc)
}

/// Elementwise arithmetic mean of equally shaped prediction arrays.
///
/// A single array comes back unchanged.
pub fn mean_stack(predictions: &[ArrayD<f32>]) -> Result<ArrayD<f32>> {
    Ok(reduce_stack(predictions, |v| v)?.mapv(|v| v as f32))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::{Cell, RefCell};
    use std::path::Path;
    use std::rc::Rc;

    use ndarray::{ArrayD, Axis, IxDyn, array};

    use super::*;
    use crate::engine::{CheckpointBackend, Session};

    /// Counters shared between a test and its fakes.
    #[derive(Debug, Default)]
    pub(crate) struct CallLog {
        pub(crate) restored: Cell<usize>,
        pub(crate) released: Cell<usize>,
        pub(crate) runs: Cell<usize>,
        pub(crate) color_vecs: RefCell<Vec<[f32; 3]>>,
    }

    /// Session whose "model" adds `offset` to every input value.
    struct FakeSession {
        calls: Rc<CallLog>,
        offset: f32,
        fail: bool,
    }

    impl Session for FakeSession {
        fn run(&mut self, fetch: &str, feed: &str, input: &Tensor) -> Result<Tensor> {
            assert_eq!((fetch, feed), ("probs", "x"));
            self.calls.runs.set(self.calls.runs.get() + 1);
            if self.fail {
                return Err(Error::Execution {
                    stage: "forward".to_string(),
                    message: "boom".to_string(),
                });
            }
            let offset = self.offset;
            Ok(Tensor::from(input.to_f32().mapv(|v| v + offset)))
        }
    }

    impl Drop for FakeSession {
        fn drop(&mut self) {
            self.calls.released.set(self.calls.released.get() + 1);
        }
    }

    /// Checkpoint name the fake backend refuses to restore.
    pub(crate) const MISSING_WEIGHTS: &str = "model-missing";

    pub(crate) struct FakeBackend {
        pub(crate) calls: Rc<CallLog>,
        pub(crate) offset: f32,
        pub(crate) fail: bool,
    }

    impl CheckpointBackend for FakeBackend {
        fn restore(&self, weights_from: &Path) -> Result<Box<dyn Session>> {
            if weights_from.ends_with(MISSING_WEIGHTS) {
                return Err(Error::Restore {
                    path: weights_from.to_path_buf(),
                    reason: "checkpoint not found".to_string(),
                });
            }
            self.calls.restored.set(self.calls.restored.get() + 1);
            Ok(Box::new(FakeSession {
                calls: Rc::clone(&self.calls),
                offset: self.offset,
                fail: self.fail,
            }))
        }
    }

    pub(crate) struct FakeStandardizer {
        pub(crate) params: BTreeMap<String, f64>,
        pub(crate) color_vec: [f32; 3],
        calls: Rc<CallLog>,
    }

    impl Standardizer for FakeStandardizer {
        fn da_processing_params(&self) -> BTreeMap<String, f64> {
            self.params.clone()
        }

        fn set_tta_args(&mut self, color_vec: [f32; 3]) {
            self.color_vec = color_vec;
            self.calls.color_vecs.borrow_mut().push(color_vec);
        }
    }

    /// Yields single-row batches of `x`, shifted by the transform's x
    /// translation, the crop's left edge, and the first color component.
    pub(crate) struct FakeIterator {
        pub(crate) standardizer: FakeStandardizer,
    }

    impl PredictionIterator for FakeIterator {
        fn batches<'a>(
            &'a mut self,
            x: &'a Tensor,
            transform: Option<&'a AffineTransform>,
            crop_bbox: Option<&'a CropBox>,
        ) -> BatchIter<'a> {
            let shift = transform.map_or(0.0, |t| t.matrix()[0][2] as f32)
                + crop_bbox.map_or(0.0, |b| b.left as f32)
                + self.standardizer.color_vec[0];
            let data = x.to_f32();
            Box::new((0..x.batch_len()).map(move |i| {
                let row = data.index_axis(Axis(0), i).insert_axis(Axis(0));
                Ok((Tensor::from(row.mapv(|v| v + shift)), None))
            }))
        }

        fn standardizer_mut(&mut self) -> &mut dyn Standardizer {
            &mut self.standardizer
        }
    }

    pub(crate) fn fake_iterator(calls: &Rc<CallLog>, params: &[(&str, f64)]) -> Box<FakeIterator> {
        Box::new(FakeIterator {
            standardizer: FakeStandardizer {
                params: params.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
                color_vec: [0.0; 3],
                calls: Rc::clone(calls),
            },
        })
    }

    pub(crate) fn fake_predictor(calls: &Rc<CallLog>, offset: f32, fail: bool) -> OneCropPredictor {
        fake_predictor_from(calls, offset, fail, "weights/model-1")
    }

    pub(crate) fn fake_predictor_from(
        calls: &Rc<CallLog>,
        offset: f32,
        fail: bool,
        weights_from: &str,
    ) -> OneCropPredictor {
        OneCropPredictor::new(
            |is_training| {
                assert!(!is_training);
                Ok(Endpoints {
                    inputs: "x".to_string(),
                    predictions: "probs".to_string(),
                })
            },
            Box::new(FakeBackend {
                calls: Rc::clone(calls),
                offset,
                fail,
            }),
            weights_from,
            fake_iterator(calls, &[("sigma", 0.0)]),
        )
        .unwrap()
    }

    pub(crate) fn input() -> Tensor {
        Tensor::from(array![[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]].into_dyn())
    }

    #[test]
    fn test_mean_stack() {
        let a = array![[1.0f32, 3.0]].into_dyn();
        let b = array![[3.0f32, 5.0]].into_dyn();
        assert_eq!(mean_stack(&[a, b]).unwrap(), array![[2.0f32, 4.0]].into_dyn());
    }

    #[test]
    fn test_mean_stack_single_is_identity() {
        let a = array![[0.1f32, 0.7, 1e-30]].into_dyn();
        assert_eq!(mean_stack(std::slice::from_ref(&a)).unwrap(), a);
    }

    #[test]
    fn test_mean_stack_rejects_mismatched_shapes() {
        let a = ArrayD::<f32>::zeros(IxDyn(&[2, 2]));
        let b = ArrayD::<f32>::zeros(IxDyn(&[2, 3]));
        assert!(matches!(mean_stack(&[a, b]), Err(Error::Shape { .. })));
        assert!(mean_stack(&[]).is_err());
    }
}
