//! Error Handling Module
//!
//! Typed errors for the crop disease library. The binaries wrap these in
//! `anyhow` at the top level.

use std::path::PathBuf;

use thiserror::Error;

/// Image bytes could not be turned into a model input
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("{0}")]
    Image(#[from] image::ImageError),

    /// Longer side exceeds `max` times the shorter side
    #[error("aspect ratio of {width}x{height} exceeds {max}:1")]
    AspectRatio { width: u32, height: u32, max: u32 },
}

/// The number of class labels does not match the classifier output width
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected {expected} class labels but the model produces {actual} outputs")]
pub struct ShapeMismatchError {
    pub expected: usize,
    pub actual: usize,
}

/// Errors raised while saving or loading a checkpoint
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint not found at {0:?}")]
    NotFound(PathBuf),

    #[error("incompatible checkpoint: {0}")]
    Incompatible(String),

    #[error("checkpoint shape mismatch: {0}")]
    ShapeMismatch(#[from] ShapeMismatchError),

    #[error("failed to save checkpoint: {0}")]
    Save(String),
}

/// Main error type for crop disease operations
#[derive(Error, Debug)]
pub enum CropDiseaseError {
    /// Dataset layout or content problem
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error loading an image from disk
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    #[error("Image decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(#[from] ShapeMismatchError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure inside the training loop
    #[error("Training error: {0}")]
    Training(String),

    /// Failure while reading model outputs
    #[error("Inference error: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for crop disease operations
pub type Result<T> = std::result::Result<T, CropDiseaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CropDiseaseError::Dataset("no class folders".to_string());
        assert_eq!(format!("{}", err), "Dataset error: no class folders");
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = ShapeMismatchError {
            expected: 2,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "expected 2 class labels but the model produces 3 outputs"
        );
    }

    #[test]
    fn test_checkpoint_error_is_transparent() {
        let err: CropDiseaseError =
            CheckpointError::NotFound(PathBuf::from("models/model_best.mpk")).into();
        assert!(err.to_string().starts_with("checkpoint not found"));
    }

    #[test]
    fn test_decode_error_from_image_error() {
        let image_err = image::load_from_memory(b"not an image").unwrap_err();
        let err: CropDiseaseError = DecodeError::from(image_err).into();
        assert!(err.to_string().starts_with("Image decode failed"));
    }
}
