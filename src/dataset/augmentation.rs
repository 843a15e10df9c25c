//! Training-time augmentation
//!
//! Applied to the train split only. The validation split and the inference
//! service use the deterministic [`EvalTransform`](crate::preprocess::EvalTransform).
//!
//! # Pipeline
//!
//! 1. Random resized crop (area scale 0.08..1.0, log-uniform aspect ratio
//!    3/4..4/3), resized to `crop x crop`
//! 2. Horizontal flip with probability 0.5
//! 3. Color jitter: brightness, contrast, saturation and hue in random order
//! 4. Scale to [0, 1] and normalize with the shared channel statistics

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::preprocess::PreprocessConfig;

/// Configuration for training augmentation
#[derive(Clone, Debug, PartialEq)]
pub struct AugmentationConfig {
    /// Range of the crop area as a fraction of the image area
    pub scale: (f64, f64),
    /// Range of the crop aspect ratio (width / height)
    pub ratio: (f64, f64),
    /// Probability of a horizontal flip
    pub horizontal_flip_prob: f32,
    /// Brightness factor drawn from [1 - b, 1 + b]
    pub brightness: f32,
    /// Contrast factor drawn from [1 - c, 1 + c]
    pub contrast: f32,
    /// Saturation factor drawn from [1 - s, 1 + s]
    pub saturation: f32,
    /// Hue shift drawn from [-h, h], as a fraction of the hue circle
    pub hue: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            scale: (0.08, 1.0),
            ratio: (3.0 / 4.0, 4.0 / 3.0),
            horizontal_flip_prob: 0.5,
            brightness: 0.2,
            contrast: 0.2,
            saturation: 0.2,
            hue: 0.1,
        }
    }
}

/// Random training transform producing normalized CHW data
#[derive(Clone, Debug)]
pub struct TrainTransform {
    config: AugmentationConfig,
    preprocess: PreprocessConfig,
}

impl TrainTransform {
    pub fn new(config: AugmentationConfig, preprocess: PreprocessConfig) -> Self {
        Self { config, preprocess }
    }

    pub fn with_defaults(preprocess: PreprocessConfig) -> Self {
        Self::new(AugmentationConfig::default(), preprocess)
    }

    /// Augment an image and return CHW data of length 3 * crop * crop
    pub fn apply<R: Rng + ?Sized>(&self, image: &DynamicImage, rng: &mut R) -> Vec<f32> {
        let crop = self.preprocess.crop as u32;
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());

        let (width, height) = rgb.dimensions();
        let (left, top, w, h) =
            random_resized_crop_params(width, height, self.config.scale, self.config.ratio, rng);
        let mut result = rgb
            .crop_imm(left, top, w, h)
            .resize_exact(crop, crop, FilterType::Triangle)
            .to_rgb8();

        if rng.gen::<f32>() < self.config.horizontal_flip_prob {
            result = image::imageops::flip_horizontal(&result);
        }

        result = self.color_jitter(result, rng);

        self.preprocess.normalize(&result)
    }

    fn color_jitter<R: Rng + ?Sized>(&self, mut img: RgbImage, rng: &mut R) -> RgbImage {
        let brightness = jitter_factor(self.config.brightness, rng);
        let contrast = jitter_factor(self.config.contrast, rng);
        let saturation = jitter_factor(self.config.saturation, rng);
        let hue = if self.config.hue > 0.0 {
            uniform(rng, -self.config.hue as f64, self.config.hue as f64) as f32
        } else {
            0.0
        };

        let mut order = [0usize, 1, 2, 3];
        order.shuffle(rng);

        for op in order {
            img = match op {
                0 => adjust_brightness(&img, brightness),
                1 => adjust_contrast(&img, contrast),
                2 => adjust_saturation(&img, saturation),
                _ => adjust_hue(&img, hue),
            };
        }

        img
    }
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    low + (high - low) * rng.gen::<f64>()
}

fn jitter_factor<R: Rng + ?Sized>(amount: f32, rng: &mut R) -> f32 {
    if amount <= 0.0 {
        return 1.0;
    }
    let low = (1.0 - amount).max(0.0) as f64;
    uniform(rng, low, 1.0 + amount as f64) as f32
}

/// Pick a crop window `(left, top, width, height)` for a random resized crop
///
/// Tries 10 random windows. Falls back to a center crop whose aspect ratio is
/// clamped to `ratio`.
pub fn random_resized_crop_params<R: Rng + ?Sized>(
    width: u32,
    height: u32,
    scale: (f64, f64),
    ratio: (f64, f64),
    rng: &mut R,
) -> (u32, u32, u32, u32) {
    let area = width as f64 * height as f64;
    let log_ratio = (ratio.0.ln(), ratio.1.ln());

    for _ in 0..10 {
        let target_area = area * uniform(rng, scale.0, scale.1);
        let aspect = uniform(rng, log_ratio.0, log_ratio.1).exp();

        let w = (target_area * aspect).sqrt().round() as u32;
        let h = (target_area / aspect).sqrt().round() as u32;

        if w > 0 && h > 0 && w <= width && h <= height {
            let top = rng.gen_range(0..=height - h);
            let left = rng.gen_range(0..=width - w);
            return (left, top, w, h);
        }
    }

    let in_ratio = width as f64 / height.max(1) as f64;
    let (w, h) = if in_ratio < ratio.0 {
        (width, ((width as f64 / ratio.0).round() as u32).min(height))
    } else if in_ratio > ratio.1 {
        (((height as f64 * ratio.1).round() as u32).min(width), height)
    } else {
        (width, height)
    };

    ((width - w) / 2, (height - h) / 2, w.max(1), h.max(1))
}

fn luma(pixel: &Rgb<u8>) -> f32 {
    0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32
}

fn blend(img: &RgbImage, factor: f32, other: impl Fn(&Rgb<u8>) -> [f32; 3]) -> RgbImage {
    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        let base = other(pixel);
        for c in 0..3 {
            let v = factor * pixel[c] as f32 + (1.0 - factor) * base[c];
            pixel[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    output
}

/// Scale all channels by `factor` (blend with black)
pub fn adjust_brightness(img: &RgbImage, factor: f32) -> RgbImage {
    blend(img, factor, |_| [0.0; 3])
}

/// Blend with the mean gray level of the image
pub fn adjust_contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let count = (img.width() as f64 * img.height() as f64).max(1.0);
    let mean = (img.pixels().map(|p| luma(p) as f64).sum::<f64>() / count).round() as f32;
    blend(img, factor, |_| [mean; 3])
}

/// Blend each pixel with its own gray value
pub fn adjust_saturation(img: &RgbImage, factor: f32) -> RgbImage {
    blend(img, factor, |p| {
        let gray = luma(p);
        [gray; 3]
    })
}

/// Rotate hue by `shift`, a fraction of the full hue circle in [-0.5, 0.5]
pub fn adjust_hue(img: &RgbImage, shift: f32) -> RgbImage {
    if shift == 0.0 {
        return img.clone();
    }

    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        let (h, s, v) = rgb_to_hsv(
            pixel[0] as f32 / 255.0,
            pixel[1] as f32 / 255.0,
            pixel[2] as f32 / 255.0,
        );
        let (r, g, b) = hsv_to_rgb((h + shift).rem_euclid(1.0), s, v);
        *pixel = Rgb([
            (r * 255.0).round().clamp(0.0, 255.0) as u8,
            (g * 255.0).round().clamp(0.0, 255.0) as u8,
            (b * 255.0).round().clamp(0.0, 255.0) as u8,
        ]);
    }
    output
}

fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };

    (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let sector = h * 6.0;
    let i = sector.floor();
    let f = sector - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    match (i as i32).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}
