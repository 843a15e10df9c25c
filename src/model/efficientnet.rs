//! EfficientNet-B0 feature extractor
//!
//! Same block layout and parameter shapes as the torchvision model, so its
//! ImageNet state dict loads as a pretrained backbone (see
//! [`super::pretrained`]). Stochastic depth is not implemented.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    tensor::{
        activation::{sigmoid, silu},
        backend::Backend,
        module::adaptive_avg_pool2d,
        Tensor,
    },
};

/// Channels produced by the stem convolution
pub const STEM_CHANNELS: usize = 32;
/// Width of the pooled feature vector
pub const NUM_FEATURES: usize = 1280;

/// One stage of MBConv blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    pub expand_ratio: usize,
    pub kernel: usize,
    pub stride: usize,
    pub out_channels: usize,
    pub layers: usize,
}

const fn stage(
    expand_ratio: usize,
    kernel: usize,
    stride: usize,
    out_channels: usize,
    layers: usize,
) -> StageSpec {
    StageSpec {
        expand_ratio,
        kernel,
        stride,
        out_channels,
        layers,
    }
}

/// B0 stages (width and depth multipliers 1.0)
pub const B0_STAGES: [StageSpec; 7] = [
    stage(1, 3, 1, 16, 1),
    stage(6, 3, 2, 24, 2),
    stage(6, 5, 2, 40, 2),
    stage(6, 3, 2, 80, 3),
    stage(6, 5, 1, 112, 3),
    stage(6, 5, 2, 192, 4),
    stage(6, 3, 1, 320, 1),
];

/// Convolution + BatchNorm, optionally followed by SiLU
#[derive(Module, Debug)]
pub struct ConvNormAct<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
    activate: bool,
}

impl<B: Backend> ConvNormAct<B> {
    pub fn new(
        channels: [usize; 2],
        kernel: usize,
        stride: usize,
        groups: usize,
        activate: bool,
        device: &B::Device,
    ) -> Self {
        let padding = kernel / 2;
        let conv = Conv2dConfig::new(channels, [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(channels[1]).init(device),
            activate,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.bn.forward(self.conv.forward(x));
        if self.activate {
            silu(x)
        } else {
            x
        }
    }
}

/// Squeeze-and-excitation gate built from 1x1 convolutions
#[derive(Module, Debug)]
pub struct SqueezeExcite<B: Backend> {
    pub fc1: Conv2d<B>,
    pub fc2: Conv2d<B>,
}

impl<B: Backend> SqueezeExcite<B> {
    pub fn new(channels: usize, squeeze_channels: usize, device: &B::Device) -> Self {
        Self {
            fc1: Conv2dConfig::new([channels, squeeze_channels], [1, 1]).init(device),
            fc2: Conv2dConfig::new([squeeze_channels, channels], [1, 1]).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let scale = adaptive_avg_pool2d(x.clone(), [1, 1]);
        let scale = silu(self.fc1.forward(scale));
        let scale = sigmoid(self.fc2.forward(scale));

        x * scale
    }
}

/// Mobile inverted bottleneck block
#[derive(Module, Debug)]
pub struct MBConv<B: Backend> {
    pub expand: Option<ConvNormAct<B>>,
    pub depthwise: ConvNormAct<B>,
    pub squeeze_excite: SqueezeExcite<B>,
    pub project: ConvNormAct<B>,
    use_residual: bool,
}

impl<B: Backend> MBConv<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        expand_ratio: usize,
        kernel: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let expanded = in_channels * expand_ratio;

        let expand = if expand_ratio != 1 {
            Some(ConvNormAct::new([in_channels, expanded], 1, 1, 1, true, device))
        } else {
            None
        };

        let depthwise = ConvNormAct::new([expanded, expanded], kernel, stride, expanded, true, device);
        let squeeze_excite = SqueezeExcite::new(expanded, (in_channels / 4).max(1), device);
        let project = ConvNormAct::new([expanded, out_channels], 1, 1, 1, false, device);

        Self {
            expand,
            depthwise,
            squeeze_excite,
            project,
            use_residual: stride == 1 && in_channels == out_channels,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut y = match &self.expand {
            Some(expand) => expand.forward(x.clone()),
            None => x.clone(),
        };

        y = self.depthwise.forward(y);
        y = self.squeeze_excite.forward(y);
        y = self.project.forward(y);

        if self.use_residual {
            y + x
        } else {
            y
        }
    }
}

/// EfficientNet-B0 without its classifier
///
/// Input `[batch, 3, H, W]`, output pooled features `[batch, 1280]`.
#[derive(Module, Debug)]
pub struct EfficientNetB0<B: Backend> {
    pub stem: ConvNormAct<B>,
    pub blocks: Vec<MBConv<B>>,
    pub head: ConvNormAct<B>,
}

impl<B: Backend> EfficientNetB0<B> {
    pub fn new(device: &B::Device) -> Self {
        let stem = ConvNormAct::new([3, STEM_CHANNELS], 3, 2, 1, true, device);

        let mut blocks = Vec::new();
        let mut in_channels = STEM_CHANNELS;

        for spec in B0_STAGES {
            for i in 0..spec.layers {
                let stride = if i == 0 { spec.stride } else { 1 };
                blocks.push(MBConv::new(
                    in_channels,
                    spec.out_channels,
                    spec.expand_ratio,
                    spec.kernel,
                    stride,
                    device,
                ));
                in_channels = spec.out_channels;
            }
        }

        let head = ConvNormAct::new([in_channels, NUM_FEATURES], 1, 1, 1, true, device);

        Self { stem, blocks, head }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.head.forward(x);

        let [batch_size, channels, _, _] = x.dims();
        adaptive_avg_pool2d(x, [1, 1]).reshape([batch_size, channels])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    type B = DefaultBackend;

    #[test]
    fn test_block_count() {
        let device = Default::default();
        let model = EfficientNetB0::<B>::new(&device);
        let expected: usize = B0_STAGES.iter().map(|s| s.layers).sum();
        assert_eq!(model.blocks.len(), expected);
        assert_eq!(expected, 16);
    }

    #[test]
    fn test_residual_only_when_shapes_match() {
        let device = Default::default();
        assert!(MBConv::<B>::new(16, 16, 6, 3, 1, &device).use_residual);
        assert!(!MBConv::<B>::new(16, 24, 6, 3, 1, &device).use_residual);
        assert!(!MBConv::<B>::new(24, 24, 6, 3, 2, &device).use_residual);
        assert!(MBConv::<B>::new(32, 16, 1, 3, 1, &device).expand.is_none());
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = EfficientNetB0::<B>::new(&device);
        let input = Tensor::<B, 4>::zeros([2, 3, 32, 32], &device);

        let features = model.forward(input);
        assert_eq!(features.dims(), [2, NUM_FEATURES]);
    }

    #[test]
    fn test_stride_two_halves_resolution() {
        let device = Default::default();
        let block = ConvNormAct::<B>::new([8, 8], 5, 2, 8, true, &device);
        let out = block.forward(Tensor::zeros([1, 8, 14, 14], &device));
        assert_eq!(out.dims(), [1, 8, 7, 7]);
    }
}
