//! Crop disease classifier: EfficientNet-B0 backbone with a linear head

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    record::{DefaultFileRecorder, FullPrecisionSettings},
    tensor::{backend::Backend, Tensor},
};

use super::efficientnet::{EfficientNetB0, NUM_FEATURES};
use super::pretrained::{is_torch_file, load_torchvision_backbone};
use crate::utils::CheckpointError;

/// Configuration for the classifier
#[derive(Config, Debug)]
pub struct CropClassifierConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Dropout before the final linear layer
    #[config(default = "0.2")]
    pub dropout: f64,
}

impl CropClassifierConfig {
    /// Build a classifier with a freshly initialized backbone and head
    pub fn init<B: Backend>(&self, device: &B::Device) -> CropClassifier<B> {
        CropClassifier {
            backbone: EfficientNetB0::new(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            head: LinearConfig::new(NUM_FEATURES, self.num_classes).init(device),
        }
    }
}

/// EfficientNet-B0 features -> dropout -> linear logits
#[derive(Module, Debug)]
pub struct CropClassifier<B: Backend> {
    pub backbone: EfficientNetB0<B>,
    pub dropout: Dropout,
    pub head: Linear<B>,
}

impl<B: Backend> CropClassifier<B> {
    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(x);
        let features = self.dropout.forward(features);
        self.head.forward(features)
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(x), 1)
    }

    /// Output width of the head, read from its weight shape
    pub fn num_classes(&self) -> usize {
        self.head.weight.val().dims()[1]
    }

    /// Replace the backbone with pretrained weights
    ///
    /// `.pth`/`.pt` files are torchvision `efficientnet_b0` state dicts;
    /// anything else is read as a burn record of [`EfficientNetB0`].
    pub fn with_pretrained_backbone(
        self,
        path: &Path,
        device: &B::Device,
    ) -> Result<Self, CheckpointError> {
        if !path.exists() {
            return Err(CheckpointError::NotFound(path.to_path_buf()));
        }

        let backbone = if is_torch_file(path) {
            let record = load_torchvision_backbone::<B>(path, device)?;
            self.backbone.load_record(record)
        } else {
            let recorder = DefaultFileRecorder::<FullPrecisionSettings>::new();
            self.backbone
                .load_file(path.to_path_buf(), &recorder, device)
                .map_err(|e| {
                    CheckpointError::Incompatible(format!("pretrained backbone {:?}: {}", path, e))
                })?
        };

        Ok(Self { backbone, ..self })
    }
}
