//! Inference Predictor Module
//!
//! Runs the eval transform and a forward pass, then pairs the softmax output
//! with the class labels by position.

use std::path::Path;
use std::sync::Arc;

use burn::tensor::backend::Backend;
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};

use crate::model::{load_checkpoint, CropClassifier};
use crate::preprocess::{check_aspect_ratio, decode_image, to_batch_tensor, EvalTransform};
use crate::utils::{CheckpointError, CropDiseaseError, Result, ShapeMismatchError};

/// One ranked class prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// External disease identifier; not mapped yet, always `None`
    pub disease_id: Option<String>,
    /// Class label
    pub name: String,
    /// Softmax probability in [0, 1]
    pub confidence: f32,
}

/// Pair labels with probabilities and sort by confidence, highest first
///
/// Equal confidences keep class order.
pub fn rank_predictions(
    classes: &[String],
    probabilities: &[f32],
) -> std::result::Result<Vec<Prediction>, ShapeMismatchError> {
    if classes.len() != probabilities.len() {
        return Err(ShapeMismatchError {
            expected: classes.len(),
            actual: probabilities.len(),
        });
    }

    let mut predictions: Vec<Prediction> = classes
        .iter()
        .zip(probabilities.iter())
        .map(|(name, &confidence)| Prediction {
            disease_id: None,
            name: name.clone(),
            confidence,
        })
        .collect();

    predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    Ok(predictions)
}

/// Classifier plus class labels, ready to score images
///
/// Use a non-autodiff backend so the model runs in inference mode. Cloning
/// is cheap: tensors are reference counted and the labels are shared.
#[derive(Debug, Clone)]
pub struct Predictor<B: Backend> {
    model: CropClassifier<B>,
    classes: Arc<Vec<String>>,
    transform: EvalTransform,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Build a predictor, checking that labels match the head width
    pub fn new(
        model: CropClassifier<B>,
        classes: Vec<String>,
        transform: EvalTransform,
        device: B::Device,
    ) -> std::result::Result<Self, ShapeMismatchError> {
        let actual = model.num_classes();
        if actual != classes.len() {
            return Err(ShapeMismatchError {
                expected: classes.len(),
                actual,
            });
        }

        Ok(Self {
            model,
            classes: Arc::new(classes),
            transform,
            device,
        })
    }

    /// Load the checkpoint at `path` with the default eval transform
    pub fn from_checkpoint(
        path: &Path,
        device: &B::Device,
    ) -> std::result::Result<Self, CheckpointError> {
        let checkpoint = load_checkpoint::<B>(path, device)?;
        Ok(Self::new(
            checkpoint.model,
            checkpoint.classes,
            EvalTransform::default(),
            device.clone(),
        )?)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Score one preprocessed CHW buffer
    pub fn predict_tensor(&self, data: Vec<f32>) -> Result<Vec<Prediction>> {
        let crop = self.transform.config().crop;
        let input = to_batch_tensor::<B>(data, crop, &self.device);

        let probabilities = self
            .model
            .forward_softmax(input)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| CropDiseaseError::Inference(format!("{:?}", e)))?;

        Ok(rank_predictions(&self.classes, &probabilities)?)
    }

    /// Score a decoded image; overly elongated images give a decode error
    pub fn predict_image(&self, image: &DynamicImage) -> Result<Vec<Prediction>> {
        check_aspect_ratio(image)?;
        self.predict_tensor(self.transform.apply(image))
    }

    /// Decode raw bytes and score them; malformed bytes give a decode error
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Vec<Prediction>> {
        let image = decode_image(bytes)?;
        self.predict_image(&image)
    }

    pub fn predict_file(&self, path: &Path) -> Result<Vec<Prediction>> {
        let image = ImageReader::open(path)
            .map_err(|e| CropDiseaseError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .with_guessed_format()
            .map_err(|e| CropDiseaseError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .decode()
            .map_err(|e| CropDiseaseError::ImageLoad(path.to_path_buf(), e.to_string()))?;
        self.predict_image(&image)
    }
}
