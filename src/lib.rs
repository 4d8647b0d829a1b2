//! # model-eval
//!
//! Evaluation of generative models and test-time prediction for trained
//! classifiers.
//!
//! The library never executes a network itself. The caller plugs a tensor
//! engine in through the traits in [`engine`], and this library handles
//! batching, the score statistics, augmentation schedules and ensembling.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use model_eval::{ClassifierRunner, NetworkConfig, default_graph_provider};
//! use model_eval::metrics::{frechet_inception_distance, inception_score};
//! use model_eval::preprocess::preprocess_for_inception;
//!
//! let config = NetworkConfig::default();
//! let provider = default_graph_provider(&config, None);
//! let runner = ClassifierRunner::new(config, Box::new(my_engine), None, Some(&provider))?;
//!
//! let generated = preprocess_for_inception(&generated_pixels)?;
//! let real = preprocess_for_inception(&real_pixels)?;
//! let is = inception_score(&generated, &runner, 10)?;
//! let fid = frechet_inception_distance(&real, &generated, &runner, 10)?;
//! ```
//!
//! ## Modules
//!
//! - [`error`]: Error types for the library
//! - [`tensor`]: Runtime-typed arrays exchanged with the engine
//! - [`engine`]: Traits the tensor engine implements
//! - [`classifier`]: Frozen classifier configuration, graph providers, runner
//! - [`preprocess`]: Image resizing and rescaling for the classifier
//! - [`metrics`]: Inception Score, Fréchet distance, matrix square root
//! - [`tta`]: Quasi-random augmentation transforms and crop layouts
//! - [`predict`]: One-crop, crop, quasi-random TTA and ensemble predictors
//! - [`import`]: CSV import and export of matrices
//! - [`report`]: Serializable score reports

pub mod classifier;
pub mod engine;
pub mod error;
pub mod import;
pub mod metrics;
pub mod predict;
pub mod preprocess;
pub mod report;
pub mod tensor;
pub mod tta;

// Re-export commonly used types
pub use classifier::{ClassifierRunner, FrozenGraph, GraphProvider, NetworkConfig};
#[cfg(feature = "download")]
pub use classifier::default_graph_provider;
pub use engine::{CheckpointBackend, ExecutionOptions, GraphExecutor, Session};
pub use error::{Error, Result};
pub use import::{MatrixImporter, read_matrix_csv, write_matrix_csv};
pub use metrics::{
    DistributionSummary, classifier_score, frechet_classifier_distance,
    frechet_inception_distance, inception_score, sqrt_symmetric,
};
pub use predict::{
    CropPredictor, EnsemblePredictor, EnsembleType, OneCropPredictor, Predictor, QuasiPredictor,
};
pub use report::ScoreReport;
pub use tensor::{DType, Scalar, Tensor};
pub use tta::{AugmentationParams, PredictionConfig};
