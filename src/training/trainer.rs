//! Supervised training loop
//!
//! A custom loop over Burn's autodiff API rather than the high-level
//! `LearnerBuilder`, so checkpointing follows the best-accuracy rule exactly.

use std::path::{Path, PathBuf};

use burn::{
    config::Config,
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion,
    },
};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{TrainingConfig, CONFIG_FILE, HISTORY_FILE};
use crate::dataset::{open_splits, CropBatch, CropBatcher, ImageFolderDataset};
use crate::model::{save_checkpoint, CropClassifier, CropClassifierConfig};
use crate::utils::{AccuracyTracker, CropDiseaseError, Result, RunningAverage, TrainingLogger};

/// Metrics of one finished epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    /// One-based epoch number
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_accuracy: f64,
    /// Whether this epoch wrote the checkpoint
    pub improved: bool,
}

/// Outcome of a full training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub epochs: Vec<EpochReport>,
    pub best_accuracy: f64,
    pub best_epoch: usize,
    pub checkpoint_path: PathBuf,
    pub classes: Vec<String>,
    /// RFC 3339 completion time
    pub finished_at: String,
}

impl TrainingSummary {
    /// Save the summary as pretty JSON
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Tracks the best validation accuracy seen so far in a run
///
/// An epoch counts as an improvement only when its accuracy is strictly
/// greater than every earlier epoch. The first epoch always counts.
#[derive(Debug, Clone, Default)]
pub struct BestTracker {
    best: Option<(usize, f64)>,
}

impl BestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an epoch result and report whether it is a new best
    pub fn update(&mut self, epoch: usize, accuracy: f64) -> bool {
        let improved = match self.best {
            Some((_, best)) => accuracy > best,
            None => true,
        };
        if improved {
            self.best = Some((epoch, accuracy));
        }
        improved
    }

    pub fn best_accuracy(&self) -> Option<f64> {
        self.best.map(|(_, acc)| acc)
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best.map(|(epoch, _)| epoch)
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Fine-tune the classifier and keep the best checkpoint
///
/// # Type Parameters
/// * `B` - The autodiff backend (e.g. `Autodiff<NdArray>` or `Autodiff<Cuda>`)
pub fn run_training<B: AutodiffBackend>(
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<TrainingSummary> {
    config.validate()?;

    println!("{}", "Loading Dataset...".cyan());
    let (train_folder, val_folder) = open_splits(&config.data_dir)?;
    train_folder.stats().print("Training split");
    val_folder.stats().print("Validation split");

    let classes = train_folder.classes.clone();
    let models_dir = Path::new(&config.models_dir);
    std::fs::create_dir_all(models_dir)?;
    config
        .save(models_dir.join(CONFIG_FILE))
        .map_err(CropDiseaseError::Io)?;

    let mut train_dataset =
        ImageFolderDataset::train(&train_folder, config.preprocess.clone(), config.seed);
    let val_dataset = ImageFolderDataset::eval(&val_folder, config.preprocess.clone());
    let batcher = CropBatcher::new(config.preprocess.crop);

    println!("{}", "Creating Model...".cyan());
    let mut model: CropClassifier<B> = CropClassifierConfig::new(classes.len())
        .with_dropout(config.dropout)
        .init(device);

    match &config.pretrained {
        Some(path) => {
            model = model.with_pretrained_backbone(Path::new(path), device)?;
            info!("Loaded pretrained backbone from {}", path);
        }
        None => warn!(
            "No pretrained backbone given; training EfficientNet-B0 from scratch \
             (pass --pretrained efficientnet_b0_rwightman-7f5810bc.pth for ImageNet weights)"
        ),
    }

    let mut optimizer = AdamWConfig::new()
        .with_weight_decay(config.weight_decay)
        .init();

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  🏷️  Classes:            {}", classes.len());
    println!("  📊 Training samples:   {}", train_dataset.len());
    println!("  ✅ Validation samples: {}", val_dataset.len());
    println!("  🔄 Epochs:             {}", config.epochs);
    println!("  📦 Batch size:         {}", config.batch_size);
    println!("  📈 Learning rate:      {}", config.learning_rate);
    println!("  🧠 Device:             {:?}", device);
    println!();

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut tracker = BestTracker::new();
    let mut logger = TrainingLogger::new(config.epochs);
    let mut reports = Vec::with_capacity(config.epochs);
    let mut checkpoint_path = crate::model::checkpoint_path(models_dir);

    for epoch in 0..config.epochs {
        logger.start_epoch(epoch);
        train_dataset.set_epoch(epoch);

        let mut indices: Vec<usize> = (0..train_dataset.len()).collect();
        indices.shuffle(&mut rng);

        let num_batches = indices.len().div_ceil(config.batch_size);
        let pb = progress_bar(num_batches);
        let mut loss_avg = RunningAverage::new();
        let mut train_acc = AccuracyTracker::new();

        for chunk in indices.chunks(config.batch_size) {
            let items = train_dataset.load_batch(chunk)?;
            let batch: CropBatch<B> = batcher.batch(items, device);

            let output = model.forward(batch.images);
            let loss = CrossEntropyLossConfig::new()
                .init(&output.device())
                .forward(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                pb.finish_and_clear();
                return Err(CropDiseaseError::Training(format!(
                    "loss became {} in epoch {}",
                    loss_value,
                    epoch + 1
                )));
            }
            loss_avg.add(loss_value);

            let total = batch.targets.dims()[0];
            let correct: i64 = output
                .argmax(1)
                .flatten::<1>(0, 1)
                .equal(batch.targets)
                .int()
                .sum()
                .into_scalar()
                .elem();
            train_acc.add_counts(correct as usize, total);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.learning_rate, model, grads);

            pb.set_message(format!("loss {:.4}", loss_value));
            pb.inc(1);
        }
        pb.finish_and_clear();

        let valid_model = model.valid();
        let val_accuracy = evaluate(
            &valid_model,
            &val_dataset,
            &batcher,
            config.val_batch_size(),
            device,
        )?;

        println!(
            "Epoch {}/{}: Validation Accuracy = {:.4}",
            epoch + 1,
            config.epochs,
            val_accuracy
        );

        let improved = tracker.update(epoch + 1, val_accuracy);
        if improved {
            checkpoint_path =
                save_checkpoint(&valid_model, &classes, epoch + 1, val_accuracy, models_dir)?;
            println!(
                "  {} New best model saved to {:?}",
                "✓".green(),
                checkpoint_path
            );
            logger.log_new_best(val_accuracy);
        }

        logger.end_epoch(loss_avg.average(), train_acc.accuracy(), val_accuracy);
        reports.push(EpochReport {
            epoch: epoch + 1,
            train_loss: loss_avg.average(),
            train_accuracy: train_acc.accuracy(),
            val_accuracy,
            improved,
        });
    }

    let best_accuracy = tracker.best_accuracy().unwrap_or(0.0);
    let best_epoch = tracker.best_epoch().unwrap_or(0);
    logger.log_complete(best_accuracy);

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!(
        "  🎉 Best validation accuracy: {:.4} (epoch {})",
        best_accuracy, best_epoch
    );
    println!("  💾 Checkpoint: {:?}", checkpoint_path);

    let summary = TrainingSummary {
        epochs: reports,
        best_accuracy,
        best_epoch,
        checkpoint_path,
        classes,
        finished_at: chrono::Utc::now().to_rfc3339(),
    };
    summary.save(&models_dir.join(HISTORY_FILE))?;

    Ok(summary)
}

/// Top-1 accuracy of `model` over the whole dataset
///
/// Call with a model on a non-autodiff backend (e.g. `model.valid()`), so
/// dropout is off and batch norm uses its running statistics.
pub fn evaluate<B: Backend>(
    model: &CropClassifier<B>,
    dataset: &ImageFolderDataset,
    batcher: &CropBatcher,
    batch_size: usize,
    device: &B::Device,
) -> Result<f64> {
    let indices: Vec<usize> = (0..dataset.len()).collect();
    let mut accuracy = AccuracyTracker::new();

    for chunk in indices.chunks(batch_size.max(1)) {
        let items = dataset.load_batch(chunk)?;
        let batch: CropBatch<B> = batcher.batch(items, device);

        let total = batch.targets.dims()[0];
        let correct: i64 = model
            .forward(batch.images)
            .argmax(1)
            .flatten::<1>(0, 1)
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();

        accuracy.add_counts(correct as usize, total);
    }

    Ok(accuracy.accuracy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DefaultBackend, TrainingBackend};
    use crate::model::load_checkpoint;
    use crate::preprocess::PreprocessConfig;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    #[test]
    fn test_best_tracker_strictly_greater() {
        let mut tracker = BestTracker::new();
        let saved: Vec<bool> = [0.70, 0.75, 0.82, 0.80, 0.81]
            .iter()
            .enumerate()
            .map(|(i, acc)| tracker.update(i + 1, *acc))
            .collect();

        assert_eq!(saved, vec![true, true, true, false, false]);
        assert_eq!(tracker.best_epoch(), Some(3));
        assert_eq!(tracker.best_accuracy(), Some(0.82));
    }

    #[test]
    fn test_best_tracker_first_epoch_always_counts() {
        let mut tracker = BestTracker::new();
        assert!(tracker.update(1, 0.0));
        assert!(!tracker.update(2, 0.0));
    }

    fn write_split(root: &Path, split: &str, per_class: usize) {
        for (class, color) in [("blight", [150u8, 80, 20]), ("healthy", [20u8, 170, 40])] {
            let dir = root.join(split).join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                ImageBuffer::from_pixel(40, 36, Rgb(color))
                    .save(dir.join(format!("{}.png", i)))
                    .unwrap();
            }
        }
    }

    #[test]
    fn test_training_writes_loadable_checkpoint() {
        let data = TempDir::new().unwrap();
        let models = TempDir::new().unwrap();
        write_split(data.path(), "train", 2);
        write_split(data.path(), "val", 1);

        let config = TrainingConfig::new(
            data.path().to_string_lossy().to_string(),
            models.path().to_string_lossy().to_string(),
        )
        .with_epochs(2)
        .with_batch_size(2)
        .with_preprocess(PreprocessConfig::new().with_resize(36).with_crop(32));

        let device = Default::default();
        let summary = run_training::<TrainingBackend>(&config, &device).unwrap();

        assert_eq!(summary.epochs.len(), 2);
        assert!(summary.epochs[0].improved);
        assert_eq!(summary.classes, vec!["blight", "healthy"]);
        assert!(summary.checkpoint_path.exists());
        assert!(models.path().join(CONFIG_FILE).exists());

        let history = TrainingSummary::load(&models.path().join(HISTORY_FILE)).unwrap();
        assert_eq!(history.epochs.len(), 2);
        assert_eq!(history.classes, summary.classes);
        assert_eq!(history.best_epoch, summary.best_epoch);
        assert!(chrono::DateTime::parse_from_rfc3339(&history.finished_at).is_ok());

        let loaded = load_checkpoint::<DefaultBackend>(&summary.checkpoint_path, &device).unwrap();
        assert_eq!(loaded.classes, summary.classes);
        assert_eq!(loaded.epoch, summary.best_epoch);
        assert_eq!(loaded.model.num_classes(), 2);
    }

    #[test]
    fn test_training_rejects_missing_data() {
        let models = TempDir::new().unwrap();
        let config = TrainingConfig::new(
            "/nonexistent/data".to_string(),
            models.path().to_string_lossy().to_string(),
        );

        let result = run_training::<TrainingBackend>(&config, &Default::default());
        assert!(matches!(result, Err(CropDiseaseError::Dataset(_))));
    }
}
