//! Inference module
//!
//! Shared by the `infer` CLI command and the HTTP service.

pub mod predictor;

pub use predictor::{rank_predictions, Prediction, Predictor};

/// Number of predictions printed by the CLI
pub const DEFAULT_TOP_K: usize = 5;
