//! Model module
//!
//! - [`efficientnet`]: EfficientNet-B0 feature extractor
//! - [`classifier`]: backbone + dropout + linear head
//! - [`checkpoint`]: versioned best-model record with class labels
//! - [`pretrained`]: torchvision ImageNet weights for the backbone

pub mod checkpoint;
pub mod classifier;
pub mod efficientnet;
pub mod pretrained;

pub use checkpoint::{
    checkpoint_path, load_checkpoint, save_checkpoint, CheckpointRecord, LoadedCheckpoint,
    ARCHITECTURE, CHECKPOINT_FILE, CHECKPOINT_FORMAT_VERSION,
};
pub use classifier::{CropClassifier, CropClassifierConfig, CropClassifierRecord};
pub use efficientnet::EfficientNetB0;

/// Dropout before the classifier head
pub const DEFAULT_DROPOUT: f64 = 0.2;
