//! Dataset module for labeled crop photos
//!
//! - [`loader`]: discovers `<split>/<class>/<image>` folders
//! - [`augmentation`]: random training transform
//! - [`burn_dataset`]: Burn `Dataset` and `Batcher` implementations

pub mod augmentation;
pub mod burn_dataset;
pub mod loader;

pub use augmentation::{AugmentationConfig, TrainTransform};
pub use burn_dataset::{CropBatch, CropBatcher, CropItem, ImageFolderDataset, ItemTransform};
pub use loader::{is_image_file, DatasetStats, ImageFolder, ImageSample, IMAGE_EXTENSIONS};

use std::path::Path;

use crate::utils::{CropDiseaseError, Result};

/// Name of the training split directory under the data directory
pub const TRAIN_DIR: &str = "train";
/// Name of the validation split directory under the data directory
pub const VAL_DIR: &str = "val";

/// Open both splits of `<data_dir>`, indexing validation with the training classes
pub fn open_splits<P: AsRef<Path>>(data_dir: P) -> Result<(ImageFolder, ImageFolder)> {
    let data_dir = data_dir.as_ref();
    let train = ImageFolder::open(data_dir.join(TRAIN_DIR))?;
    let val = ImageFolder::open_with_classes(data_dir.join(VAL_DIR), &train.classes)?;

    if train.is_empty() {
        return Err(CropDiseaseError::Dataset(format!(
            "training split {:?} contains no images",
            train.root_dir
        )));
    }
    if val.is_empty() {
        return Err(CropDiseaseError::Dataset(format!(
            "validation split {:?} contains no images",
            val.root_dir
        )));
    }

    Ok((train, val))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_splits_requires_validation_images() {
        let tmp = TempDir::new().unwrap();
        let train_dir = tmp.path().join(TRAIN_DIR).join("healthy");
        std::fs::create_dir_all(&train_dir).unwrap();
        std::fs::write(train_dir.join("a.png"), b"x").unwrap();
        std::fs::create_dir_all(tmp.path().join(VAL_DIR)).unwrap();

        let err = open_splits(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("validation split"));
    }

    #[test]
    fn test_open_splits_shares_class_list() {
        let tmp = TempDir::new().unwrap();
        for (split, class) in [(TRAIN_DIR, "blight"), (TRAIN_DIR, "healthy"), (VAL_DIR, "healthy")] {
            let dir = tmp.path().join(split).join(class);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("a.png"), b"x").unwrap();
        }

        let (train, val) = open_splits(tmp.path()).unwrap();
        assert_eq!(train.classes, val.classes);
        assert_eq!(val.samples[0].label, 1);
    }
}
