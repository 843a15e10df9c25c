//! # Crop Disease Classification
//!
//! Fine-tunes an EfficientNet-B0 classifier on labeled crop photos with the
//! Burn framework and serves predictions from the resulting checkpoint.
//!
//! ## Modules
//!
//! - `preprocess`: resize / center-crop / normalize contract shared by
//!   validation and inference
//! - `dataset`: image folder loading, training augmentation, Burn batching
//! - `model`: EfficientNet-B0 classifier and the versioned checkpoint record
//! - `training`: supervised training loop with best-accuracy checkpointing
//! - `inference`: predictor producing ranked class probabilities
//! - `utils`: errors, logging, metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crop_disease::backend::{default_device, DefaultBackend, TrainingBackend};
//! use crop_disease::inference::Predictor;
//! use crop_disease::training::{run_training, TrainingConfig};
//!
//! let device = default_device();
//! let config = TrainingConfig::new("data".into(), "models".into());
//! let summary = run_training::<TrainingBackend>(&config, &device)?;
//!
//! let predictor = Predictor::<DefaultBackend>::from_checkpoint(&summary.checkpoint_path, &device)?;
//! let ranked = predictor.predict_file("leaf.jpg".as_ref())?;
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod preprocess;
pub mod training;
pub mod utils;

pub use inference::{Prediction, Predictor};
pub use model::{CropClassifier, CropClassifierConfig};
pub use preprocess::{EvalTransform, PreprocessConfig};
pub use training::TrainingConfig;
pub use utils::error::{CheckpointError, CropDiseaseError, DecodeError, Result, ShapeMismatchError};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
