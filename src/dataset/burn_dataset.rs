//! Burn Dataset Integration
//!
//! An image folder split with per-item transforms, and a `Batcher` that
//! stacks preprocessed items into tensors. Images are decoded lazily; a batch
//! is loaded in parallel with rayon and fails on the first unreadable image.

use std::path::PathBuf;

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use image::ImageReader;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::augmentation::TrainTransform;
use super::loader::ImageFolder;
use crate::preprocess::{EvalTransform, PreprocessConfig};
use crate::utils::{CropDiseaseError, Result};

/// A single preprocessed item ready for batching
#[derive(Clone, Debug)]
pub struct CropItem {
    /// Normalized image data as flattened CHW array [3 * crop * crop]
    pub image: Vec<f32>,
    /// Class label
    pub label: usize,
}

/// Which transform a dataset applies to its images
#[derive(Clone, Debug)]
pub enum ItemTransform {
    /// Random augmentation, reseeded per item and epoch
    Train(TrainTransform),
    /// Deterministic resize + center crop
    Eval(EvalTransform),
}

/// Lazily decoded image folder split
#[derive(Clone, Debug)]
pub struct ImageFolderDataset {
    samples: Vec<(PathBuf, usize)>,
    transform: ItemTransform,
    seed: u64,
    epoch: usize,
}

impl ImageFolderDataset {
    pub fn new(samples: Vec<(PathBuf, usize)>, transform: ItemTransform, seed: u64) -> Self {
        Self {
            samples,
            transform,
            seed,
            epoch: 0,
        }
    }

    /// Training split with random augmentation
    pub fn train(folder: &ImageFolder, preprocess: PreprocessConfig, seed: u64) -> Self {
        Self::new(
            folder.pairs(),
            ItemTransform::Train(TrainTransform::with_defaults(preprocess)),
            seed,
        )
    }

    /// Validation split with the deterministic eval transform
    pub fn eval(folder: &ImageFolder, preprocess: PreprocessConfig) -> Self {
        Self::new(
            folder.pairs(),
            ItemTransform::Eval(EvalTransform::new(preprocess)),
            0,
        )
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Select the epoch used to derive per-item augmentation seeds
    pub fn set_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
    }

    /// Derive the RNG seed for one item in the current epoch
    fn item_seed(&self, index: usize) -> u64 {
        self.seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add((self.epoch as u64) << 32)
            .wrapping_add(index as u64)
    }

    /// Decode and transform one item
    pub fn load(&self, index: usize) -> Result<CropItem> {
        let (path, label) = self.samples.get(index).ok_or_else(|| {
            CropDiseaseError::Dataset(format!(
                "index {} out of range for dataset of {} samples",
                index,
                self.samples.len()
            ))
        })?;

        let img = ImageReader::open(path)
            .map_err(|e| CropDiseaseError::ImageLoad(path.clone(), e.to_string()))?
            .with_guessed_format()
            .map_err(|e| CropDiseaseError::ImageLoad(path.clone(), e.to_string()))?
            .decode()
            .map_err(|e| CropDiseaseError::ImageLoad(path.clone(), e.to_string()))?;

        let image = match &self.transform {
            ItemTransform::Train(transform) => {
                let mut rng = ChaCha8Rng::seed_from_u64(self.item_seed(index));
                transform.apply(&img, &mut rng)
            }
            ItemTransform::Eval(transform) => transform.apply(&img),
        };

        Ok(CropItem {
            image,
            label: *label,
        })
    }

    /// Load several items in parallel, failing on the first unreadable image
    pub fn load_batch(&self, indices: &[usize]) -> Result<Vec<CropItem>> {
        indices.par_iter().map(|&index| self.load(index)).collect()
    }
}

/// A batch of images and labels
#[derive(Clone, Debug)]
pub struct CropBatch<B: Backend> {
    /// Images with shape [batch_size, 3, crop, crop]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher stacking already-normalized items
#[derive(Clone, Debug)]
pub struct CropBatcher {
    crop: usize,
}

impl CropBatcher {
    pub fn new(crop: usize) -> Self {
        Self { crop }
    }
}

impl<B: Backend> Batcher<B, CropItem, CropBatch<B>> for CropBatcher {
    fn batch(&self, items: Vec<CropItem>, device: &B::Device) -> CropBatch<B> {
        let batch_size = items.len();

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let images_data: Vec<f32> = items.into_iter().flat_map(|item| item.image).collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, self.crop, self.crop]),
            device,
        );
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        CropBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn write_dataset(root: &std::path::Path) {
        for (class, color) in [("blight", [120u8, 60, 20]), ("healthy", [30u8, 160, 40])] {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..2 {
                ImageBuffer::from_pixel(48, 40, Rgb(color))
                    .save(dir.join(format!("{}.png", i)))
                    .unwrap();
            }
        }
    }

    fn preprocess() -> PreprocessConfig {
        PreprocessConfig::new().with_resize(36).with_crop(32)
    }

    #[test]
    fn test_eval_dataset_loads_items() {
        let tmp = TempDir::new().unwrap();
        write_dataset(tmp.path());
        let folder = ImageFolder::open(tmp.path()).unwrap();
        let dataset = ImageFolderDataset::eval(&folder, preprocess());

        assert_eq!(dataset.len(), 4);
        let item = dataset.load(3).unwrap();
        assert_eq!(item.label, 1);
        assert_eq!(item.image.len(), 3 * 32 * 32);
        assert!(matches!(dataset.load(4), Err(CropDiseaseError::Dataset(_))));
    }

    #[test]
    fn test_train_item_is_reproducible_within_epoch() {
        let tmp = TempDir::new().unwrap();
        write_dataset(tmp.path());
        let folder = ImageFolder::open(tmp.path()).unwrap();
        let mut dataset = ImageFolderDataset::train(&folder, preprocess(), 42);

        let first = dataset.load(0).unwrap();
        let again = dataset.load(0).unwrap();
        assert_eq!(first.image, again.image);

        let epoch0_seed = dataset.item_seed(0);
        dataset.set_epoch(1);
        assert_ne!(dataset.item_seed(0), epoch0_seed);
    }

    #[test]
    fn test_load_batch_keeps_order() {
        let tmp = TempDir::new().unwrap();
        write_dataset(tmp.path());
        let folder = ImageFolder::open(tmp.path()).unwrap();
        let dataset = ImageFolderDataset::eval(&folder, preprocess());

        let items = dataset.load_batch(&[3, 0, 2]).unwrap();
        let labels: Vec<usize> = items.iter().map(|i| i.label).collect();
        assert_eq!(labels, vec![1, 0, 1]);
    }

    #[test]
    fn test_unreadable_image_is_image_load_error() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("blight");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("broken.png"), b"not a png").unwrap();

        let folder = ImageFolder::open(tmp.path()).unwrap();
        let dataset = ImageFolderDataset::eval(&folder, preprocess());

        assert!(matches!(dataset.load(0), Err(CropDiseaseError::ImageLoad(..))));
        assert!(matches!(
            dataset.load_batch(&[0]),
            Err(CropDiseaseError::ImageLoad(..))
        ));
    }

    #[test]
    fn test_batcher_shapes() {
        let device = Default::default();
        let batcher = CropBatcher::new(4);
        let items = vec![
            CropItem {
                image: vec![0.0; 3 * 4 * 4],
                label: 0,
            },
            CropItem {
                image: vec![1.0; 3 * 4 * 4],
                label: 1,
            },
        ];

        let batch: CropBatch<DefaultBackend> = batcher.batch(items, &device);
        assert_eq!(batch.images.dims(), [2, 3, 4, 4]);
        assert_eq!(batch.targets.dims(), [2]);
    }
}
