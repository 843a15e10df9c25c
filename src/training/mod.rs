//! Training module
//!
//! Supervised fine-tuning of the crop classifier with a plain training loop:
//! AdamW, cross-entropy, one validation pass per epoch, and a checkpoint
//! whenever validation accuracy beats every earlier epoch of the run.

pub mod trainer;

pub use trainer::{evaluate, run_training, BestTracker, EpochReport, TrainingSummary};

use burn::config::Config;

use crate::preprocess::PreprocessConfig;
use crate::utils::{CropDiseaseError, Result as CrateResult};

/// File name of the JSON copy of the training configuration
pub const CONFIG_FILE: &str = "training_config.json";

/// File name of the per-epoch history written after training
pub const HISTORY_FILE: &str = "training_history.json";

/// Training hyperparameters and paths
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Directory containing `train/` and `val/`
    pub data_dir: String,

    /// Directory receiving the checkpoint
    pub models_dir: String,

    #[config(default = 15)]
    pub epochs: usize,

    /// Training batch size; validation uses twice this
    #[config(default = 32)]
    pub batch_size: usize,

    #[config(default = 3e-4)]
    pub learning_rate: f64,

    /// AdamW decoupled weight decay
    #[config(default = 0.01)]
    pub weight_decay: f32,

    #[config(default = 0.2)]
    pub dropout: f64,

    /// Seed for shuffling and augmentation
    #[config(default = 42)]
    pub seed: u64,

    /// Optional EfficientNet-B0 backbone record to start from
    pub pretrained: Option<String>,

    #[config(default = "PreprocessConfig::new()")]
    pub preprocess: PreprocessConfig,
}

impl TrainingConfig {
    pub fn val_batch_size(&self) -> usize {
        self.batch_size * 2
    }

    /// Reject values the training loop cannot run with
    pub fn validate(&self) -> CrateResult<()> {
        if self.epochs == 0 {
            return Err(CropDiseaseError::Config("epochs must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(CropDiseaseError::Config(
                "batch size must be at least 1".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(CropDiseaseError::Config(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(CropDiseaseError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        self.preprocess.validate()
    }
}
