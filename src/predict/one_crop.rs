//! Single forward pass per input batch.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::{ArrayD, ArrayViewD, Axis, concatenate};
use tracing::{debug, info};

use super::{Endpoints, PredictionIterator, Predictor, Standardizer};
use crate::engine::{CheckpointBackend, Session};
use crate::error::{Error, Result};
use crate::tensor::Tensor;
use crate::tta::{AffineTransform, CropBox};

/// A restored session, released when dropped.
pub struct ScopedSession {
    inner: Box<dyn Session>,
    weights_from: PathBuf,
}

impl Deref for ScopedSession {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for ScopedSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        debug!(weights = %self.weights_from.display(), "releasing session");
    }
}

/// Predicts from a single view of each input.
pub struct OneCropPredictor {
    backend: Box<dyn CheckpointBackend>,
    weights_from: PathBuf,
    iterator: Box<dyn PredictionIterator>,
    endpoints: Endpoints,
}

impl OneCropPredictor {
    /// Build the inference model with `model(false)` and remember where its
    /// weights live. Nothing is restored until the first prediction.
    pub fn new(
        model: impl FnOnce(bool) -> Result<Endpoints>,
        backend: Box<dyn CheckpointBackend>,
        weights_from: impl Into<PathBuf>,
        iterator: Box<dyn PredictionIterator>,
    ) -> Result<Self> {
        let endpoints = model(false)?;
        Ok(Self {
            backend,
            weights_from: weights_from.into(),
            iterator,
            endpoints,
        })
    }

    /// Checkpoint the weights are restored from.
    #[must_use]
    pub fn weights_from(&self) -> &Path {
        &self.weights_from
    }

    /// Tensor names of the inference model.
    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Standardizer of the underlying prediction iterator.
    pub fn standardizer_mut(&mut self) -> &mut dyn Standardizer {
        self.iterator.standardizer_mut()
    }

    /// Restore the weights into a fresh session.
    pub fn open_session(&self) -> Result<ScopedSession> {
        debug!(weights = %self.weights_from.display(), "restoring session");
        let inner = self.backend.restore(&self.weights_from)?;
        Ok(ScopedSession {
            inner,
            weights_from: self.weights_from.clone(),
        })
    }

    /// One full pass over `x` inside an already restored session.
    pub fn predict_in_session(
        &mut self,
        session: &mut ScopedSession,
        x: &Tensor,
        transform: Option<&AffineTransform>,
        crop_bbox: Option<&CropBox>,
    ) -> Result<ArrayD<f32>> {
        let start = Instant::now();
        info!("Making {} predictions", x.batch_len());

        let mut outputs = Vec::new();
        for batch in self.iterator.batches(x, transform, crop_bbox) {
            let (inputs, _labels) = batch?;
            let predictions =
                session.run(&self.endpoints.predictions, &self.endpoints.inputs, &inputs)?;
            outputs.push(predictions.to_f32());
        }
        if outputs.is_empty() {
            return Err(Error::Execution {
                stage: "predict".to_string(),
                message: "prediction iterator produced no batches".to_string(),
            });
        }
        let views: Vec<ArrayViewD<'_, f32>> = outputs.iter().map(|a| a.view()).collect();
        let predictions = concatenate(Axis(0), &views)?;

        info!("took {:6.1} seconds", start.elapsed().as_secs_f64());
        Ok(predictions)
    }
}

impl Predictor for OneCropPredictor {
    fn predict(&mut self, x: &Tensor) -> Result<ArrayD<f32>> {
        let mut session = self.open_session()?;
        self.predict_in_session(&mut session, x, None, None)
    }

    fn name(&self) -> String {
        format!("OneCropPredictor({})", self.weights_from.display())
    }
}
