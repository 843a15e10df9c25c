//! Shared preprocessing contract
//!
//! The validation split during training and the inference service must feed
//! the network identically prepared tensors: resize the shorter side to 256,
//! center-crop 224x224, scale to [0, 1], then normalize with the ImageNet
//! channel statistics. Both sides build their transform from
//! [`PreprocessConfig::new`] so the constants live in one place.

use burn::config::Config;
use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};

use crate::utils::{CropDiseaseError, DecodeError};

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
/// Shorter-side resize target before cropping
pub const RESIZE_SIZE: usize = 256;
/// Square crop fed to the network
pub const CROP_SIZE: usize = 224;
/// Largest accepted longer/shorter side ratio for inference inputs
///
/// Resizing the shorter side to 256 makes the longer side at most
/// 256 * 20 = 5120 pixels.
pub const MAX_ASPECT_RATIO: u32 = 20;

/// Preprocessing parameters shared by training and inference
#[derive(Config, Debug, PartialEq)]
pub struct PreprocessConfig {
    /// Shorter side is resized to this many pixels (eval transform only)
    #[config(default = 256)]
    pub resize: usize,

    /// Side length of the square crop fed to the model
    #[config(default = 224)]
    pub crop: usize,

    /// Per-channel mean subtracted after scaling to [0, 1]
    #[config(default = "[0.485, 0.456, 0.406]")]
    pub mean: [f32; 3],

    /// Per-channel std used to divide after mean subtraction
    #[config(default = "[0.229, 0.224, 0.225]")]
    pub std: [f32; 3],
}

impl PreprocessConfig {
    /// Check the parameters describe a usable transform
    pub fn validate(&self) -> Result<(), CropDiseaseError> {
        if self.crop == 0 || self.resize == 0 {
            return Err(CropDiseaseError::Config(
                "resize and crop must be greater than 0".to_string(),
            ));
        }
        if self.crop > self.resize {
            return Err(CropDiseaseError::Config(format!(
                "crop ({}) must not exceed resize ({})",
                self.crop, self.resize
            )));
        }
        if self.std.iter().any(|s| *s <= 0.0) {
            return Err(CropDiseaseError::Config(
                "std values must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of f32 values in one preprocessed image (3 * crop * crop)
    pub fn tensor_len(&self) -> usize {
        3 * self.crop * self.crop
    }

    /// Scale an RGB image to [0, 1], normalize per channel, emit CHW data
    pub fn normalize(&self, rgb: &RgbImage) -> Vec<f32> {
        let (width, height) = rgb.dimensions();
        let num_pixels = (width * height) as usize;
        let mut data = vec![0.0f32; 3 * num_pixels];

        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                data[c * num_pixels + i] = (value - self.mean[c]) / self.std[c];
            }
        }

        data
    }
}

/// Decode raw bytes (any format the `image` crate knows) into an image
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Reject empty images and images more elongated than [`MAX_ASPECT_RATIO`]
pub fn check_aspect_ratio(image: &DynamicImage) -> Result<(), DecodeError> {
    let (width, height) = image.dimensions();
    let (short, long) = (width.min(height) as u64, width.max(height) as u64);
    if short == 0 || long > short * MAX_ASPECT_RATIO as u64 {
        return Err(DecodeError::AspectRatio {
            width,
            height,
            max: MAX_ASPECT_RATIO,
        });
    }
    Ok(())
}

/// Resize so the shorter side equals `target`, keeping the aspect ratio
pub fn resize_shorter_side(image: &DynamicImage, target: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.resize_exact(target, target, FilterType::Triangle);
    }

    let (new_width, new_height) = if width <= height {
        let scaled = (target as u64 * height as u64 / width as u64) as u32;
        (target, scaled.max(target))
    } else {
        let scaled = (target as u64 * width as u64 / height as u64) as u32;
        (scaled.max(target), target)
    };

    image.resize_exact(new_width, new_height, FilterType::Triangle)
}

/// Crop a `size` x `size` window from the middle of the image
pub fn center_crop(image: &DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let left = (width.saturating_sub(size) as f32 / 2.0).round_ties_even() as u32;
    let top = (height.saturating_sub(size) as f32 / 2.0).round_ties_even() as u32;
    image.crop_imm(left, top, size.min(width), size.min(height))
}

/// Deterministic resize + center-crop + normalize transform
#[derive(Debug, Clone)]
pub struct EvalTransform {
    config: PreprocessConfig,
}

impl Default for EvalTransform {
    fn default() -> Self {
        Self::new(PreprocessConfig::new())
    }
}

impl EvalTransform {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Apply the transform and return CHW data of length 3 * crop * crop
    pub fn apply(&self, image: &DynamicImage) -> Vec<f32> {
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let resized = resize_shorter_side(&rgb, self.config.resize as u32);
        let cropped = center_crop(&resized, self.config.crop as u32);
        self.config.normalize(&cropped.to_rgb8())
    }

    /// Decode bytes and apply the transform
    pub fn apply_bytes(&self, bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
        let image = decode_image(bytes)?;
        check_aspect_ratio(&image)?;
        Ok(self.apply(&image))
    }
}

/// Build a `[1, 3, crop, crop]` tensor from one preprocessed image
pub fn to_batch_tensor<B: Backend>(data: Vec<f32>, crop: usize, device: &B::Device) -> Tensor<B, 4> {
    Tensor::<B, 4>::from_floats(TensorData::new(data, [1, 3, crop, crop]), device)
}
