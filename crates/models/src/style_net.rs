//! Transformer network: reflection-padded, instance-normalized convolutions around a stack of
//! residual blocks, with nearest-neighbour upsampling on the way back to full resolution.

use burn::module::Module;
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleTransferNetConfig {
    /// Channels after the first convolution; the encoder doubles this twice.
    pub base_channels: usize,
    pub residual_blocks: usize,
    pub norm_epsilon: f64,
}

impl Default for StyleTransferNetConfig {
    fn default() -> Self {
        Self {
            base_channels: 32,
            residual_blocks: 5,
            norm_epsilon: 1e-3,
        }
    }
}

/// Both strided convolutions halve the resolution; inputs must be multiples of this.
pub const INPUT_MULTIPLE: usize = 4;
/// Smallest side the reflection padding accepts at the quarter-resolution stage.
pub const MIN_INPUT_SIDE: usize = 8;

/// Check that a `height` x `width` input runs through `StyleTransferNet` and comes out the same size.
pub fn check_input_size(height: usize, width: usize) -> Result<(), String> {
    if height % INPUT_MULTIPLE != 0 || width % INPUT_MULTIPLE != 0 {
        return Err(format!(
            "input {width}x{height} must have both sides divisible by {INPUT_MULTIPLE}"
        ));
    }
    if height < MIN_INPUT_SIDE || width < MIN_INPUT_SIDE {
        return Err(format!(
            "input {width}x{height} is below the {MIN_INPUT_SIDE}x{MIN_INPUT_SIDE} minimum"
        ));
    }
    Ok(())
}

/// Mirror-pad the two spatial dims of an NCHW tensor, excluding the edge itself.
///
/// `[a, b, c, d]` padded by 2 becomes `[c, b, a, b, c, d, c, b]`.
pub fn reflection_pad2d<B: Backend>(x: Tensor<B, 4>, pad: usize) -> Tensor<B, 4> {
    if pad == 0 {
        return x;
    }
    let [_, _, height, width] = x.dims();
    assert!(
        pad < height && pad < width,
        "reflection pad {pad} needs spatial dims larger than the pad, got {height}x{width}"
    );

    let top = x.clone().narrow(2, 1, pad).flip([2]);
    let bottom = x.clone().narrow(2, height - 1 - pad, pad).flip([2]);
    let x = Tensor::cat(vec![top, x, bottom], 2);

    let left = x.clone().narrow(3, 1, pad).flip([3]);
    let right = x.clone().narrow(3, width - 1 - pad, pad).flip([3]);
    Tensor::cat(vec![left, x, right], 3)
}

/// Reflection pad, valid convolution, instance norm.
#[derive(Debug, Module)]
pub struct ConvLayer<B: Backend> {
    conv: Conv2d<B>,
    norm: nn::InstanceNorm<B>,
    pad: usize,
}

impl<B: Backend> ConvLayer<B> {
    pub fn new(
        channels: [usize; 2],
        kernel: usize,
        stride: usize,
        norm_epsilon: f64,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new(channels, [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Valid)
            .init(device);
        let norm = nn::InstanceNormConfig::new(channels[1])
            .with_epsilon(norm_epsilon)
            .init(device);
        Self {
            conv,
            norm,
            pad: kernel / 2,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = reflection_pad2d(x, self.pad);
        let x = self.conv.forward(x);
        self.norm.forward(x)
    }
}

#[derive(Debug, Module)]
pub struct ResidualBlock<B: Backend> {
    conv1: ConvLayer<B>,
    conv2: ConvLayer<B>,
}

impl<B: Backend> ResidualBlock<B> {
    pub fn new(channels: usize, norm_epsilon: f64, device: &B::Device) -> Self {
        Self {
            conv1: ConvLayer::new([channels, channels], 3, 1, norm_epsilon, device),
            conv2: ConvLayer::new([channels, channels], 3, 1, norm_epsilon, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let residual = x.clone();
        let x = relu(self.conv1.forward(x));
        self.conv2.forward(x) + residual
    }
}

/// Nearest-neighbour upsampling followed by a stride-1 `ConvLayer`.
#[derive(Debug, Module)]
pub struct UpsampleLayer<B: Backend> {
    layer: ConvLayer<B>,
    scale: usize,
}

impl<B: Backend> UpsampleLayer<B> {
    pub fn new(channels: [usize; 2], kernel: usize, norm_epsilon: f64, device: &B::Device) -> Self {
        Self {
            layer: ConvLayer::new(channels, kernel, 1, norm_epsilon, device),
            scale: 2,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = x.dims();
        let x = interpolate(
            x,
            [height * self.scale, width * self.scale],
            InterpolateOptions::new(InterpolateMode::Nearest),
        );
        self.layer.forward(x)
    }
}

#[derive(Debug, Module)]
pub struct StyleTransferNet<B: Backend> {
    conv1: ConvLayer<B>,
    conv2: ConvLayer<B>,
    conv3: ConvLayer<B>,
    residuals: Vec<ResidualBlock<B>>,
    up1: UpsampleLayer<B>,
    up2: UpsampleLayer<B>,
    conv_out: ConvLayer<B>,
}

impl<B: Backend> StyleTransferNet<B> {
    pub fn new(cfg: StyleTransferNetConfig, device: &B::Device) -> Self {
        let c1 = cfg.base_channels.max(1);
        let c2 = c1 * 2;
        let c3 = c1 * 4;
        let eps = cfg.norm_epsilon;
        let residuals = (0..cfg.residual_blocks)
            .map(|_| ResidualBlock::new(c3, eps, device))
            .collect();
        Self {
            conv1: ConvLayer::new([3, c1], 9, 1, eps, device),
            conv2: ConvLayer::new([c1, c2], 3, 2, eps, device),
            conv3: ConvLayer::new([c2, c3], 3, 2, eps, device),
            residuals,
            up1: UpsampleLayer::new([c3, c2], 3, eps, device),
            up2: UpsampleLayer::new([c2, c1], 3, eps, device),
            conv_out: ConvLayer::new([c1, 3], 9, 1, eps, device),
        }
    }

    /// Stylize a batch of RGB images in [0, 1]; returns RGB in [0, 255].
    ///
    /// # Panics
    ///
    /// When either spatial side is below [`MIN_INPUT_SIDE`]; see [`check_input_size`].
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.conv1.forward(input));
        let x = relu(self.conv2.forward(x));
        let mut x = relu(self.conv3.forward(x));
        for block in &self.residuals {
            x = block.forward(x);
        }
        let x = relu(self.up1.forward(x));
        let x = relu(self.up2.forward(x));
        let x = self.conv_out.forward(x);
        (x.tanh() + 1.0) * 127.5
    }

    /// Shape after every stage of `forward`, for architecture summaries. Same input limits as
    /// `forward`.
    pub fn trace_shapes(&self, input: Tensor<B, 4>) -> Vec<(String, [usize; 4])> {
        let mut shapes = vec![("input".to_string(), input.dims())];
        let x = relu(self.conv1.forward(input));
        shapes.push(("conv1".to_string(), x.dims()));
        let x = relu(self.conv2.forward(x));
        shapes.push(("conv2".to_string(), x.dims()));
        let mut x = relu(self.conv3.forward(x));
        shapes.push(("conv3".to_string(), x.dims()));
        for (i, block) in self.residuals.iter().enumerate() {
            x = block.forward(x);
            shapes.push((format!("residual{}", i + 1), x.dims()));
        }
        let x = relu(self.up1.forward(x));
        shapes.push(("up1".to_string(), x.dims()));
        let x = relu(self.up2.forward(x));
        shapes.push(("up2".to_string(), x.dims()));
        let x = self.conv_out.forward(x);
        shapes.push(("conv_out".to_string(), x.dims()));
        shapes
    }
}
