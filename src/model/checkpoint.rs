//! Best-model checkpoint
//!
//! A single burn record file holds the classifier parameters together with
//! the class labels in output order:
//!
//! ```text
//! models/
//!   model_best.mpk   <- format_version, architecture, classes, epoch, accuracy, model
//! ```
//!
//! Loading checks the schema before the model is handed out, so a stale or
//! foreign file fails with [`CheckpointError`] instead of producing garbage.

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{DefaultFileRecorder, FullPrecisionSettings, Record, Recorder},
    tensor::backend::Backend,
};
use tracing::{debug, info};

use super::classifier::{CropClassifier, CropClassifierConfig, CropClassifierRecord};
use crate::utils::{CheckpointError, ShapeMismatchError};

/// Version written into every checkpoint
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;
/// Architecture tag written into every checkpoint
pub const ARCHITECTURE: &str = "efficientnet_b0";
/// File name of the best checkpoint inside the models directory
pub const CHECKPOINT_FILE: &str = "model_best.mpk";

/// On-disk checkpoint layout
#[derive(Record)]
pub struct CheckpointRecord<B: Backend> {
    pub format_version: u32,
    pub architecture: String,
    pub classes: Vec<String>,
    pub epoch: usize,
    pub accuracy: f64,
    pub model: CropClassifierRecord<B>,
}

/// A checkpoint that passed the schema and shape checks
#[derive(Debug)]
pub struct LoadedCheckpoint<B: Backend> {
    pub model: CropClassifier<B>,
    pub classes: Vec<String>,
    /// One-based epoch that produced the snapshot
    pub epoch: usize,
    pub accuracy: f64,
}

/// Path of the best checkpoint inside `models_dir`
pub fn checkpoint_path(models_dir: &Path) -> PathBuf {
    models_dir.join(CHECKPOINT_FILE)
}

fn recorder() -> DefaultFileRecorder<FullPrecisionSettings> {
    DefaultFileRecorder::<FullPrecisionSettings>::new()
}

/// Write the model and its class labels, overwriting any previous checkpoint
pub fn save_checkpoint<B: Backend>(
    model: &CropClassifier<B>,
    classes: &[String],
    epoch: usize,
    accuracy: f64,
    models_dir: &Path,
) -> Result<PathBuf, CheckpointError> {
    let actual = model.num_classes();
    if actual != classes.len() {
        return Err(ShapeMismatchError {
            expected: classes.len(),
            actual,
        }
        .into());
    }

    std::fs::create_dir_all(models_dir)
        .map_err(|e| CheckpointError::Save(format!("{:?}: {}", models_dir, e)))?;

    let path = checkpoint_path(models_dir);
    let record = CheckpointRecord {
        format_version: CHECKPOINT_FORMAT_VERSION,
        architecture: ARCHITECTURE.to_string(),
        classes: classes.to_vec(),
        epoch,
        accuracy,
        model: model.clone().into_record(),
    };

    recorder()
        .record(record, path.clone())
        .map_err(|e| CheckpointError::Save(format!("{:?}: {}", path, e)))?;

    debug!("Saved checkpoint to {:?} (epoch {}, accuracy {:.4})", path, epoch, accuracy);
    Ok(path)
}

/// Read a checkpoint and rebuild the classifier it describes
pub fn load_checkpoint<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<LoadedCheckpoint<B>, CheckpointError> {
    if !path.is_file() {
        return Err(CheckpointError::NotFound(path.to_path_buf()));
    }

    let record: CheckpointRecord<B> = recorder()
        .load(path.to_path_buf(), device)
        .map_err(|e| CheckpointError::Incompatible(format!("cannot decode {:?}: {}", path, e)))?;

    if record.format_version != CHECKPOINT_FORMAT_VERSION {
        return Err(CheckpointError::Incompatible(format!(
            "unsupported format version {} (expected {})",
            record.format_version, CHECKPOINT_FORMAT_VERSION
        )));
    }
    if record.architecture != ARCHITECTURE {
        return Err(CheckpointError::Incompatible(format!(
            "unsupported architecture '{}' (expected '{}')",
            record.architecture, ARCHITECTURE
        )));
    }
    if record.classes.is_empty() {
        return Err(CheckpointError::Incompatible(
            "checkpoint has no class labels".to_string(),
        ));
    }

    // Linear weights are stored as [d_input, d_output]
    let actual = record.model.head.weight.val().dims()[1];
    if actual != record.classes.len() {
        return Err(ShapeMismatchError {
            expected: record.classes.len(),
            actual,
        }
        .into());
    }

    let model = CropClassifierConfig::new(record.classes.len())
        .init::<B>(device)
        .load_record(record.model);

    info!(
        "Loaded checkpoint {:?}: {} classes, epoch {}, accuracy {:.4}",
        path,
        record.classes.len(),
        record.epoch,
        record.accuracy
    );

    Ok(LoadedCheckpoint {
        model,
        classes: record.classes,
        epoch: record.epoch,
        accuracy: record.accuracy,
    })
}
