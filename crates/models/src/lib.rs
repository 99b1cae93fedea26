//! Burn modules for fast neural style transfer.
//!
//! - `StyleTransferNet`: the feed-forward transformer network (downsampling convolutions, residual
//!   blocks, learned upsampling) that renders a photo in a fixed style in one pass.
//! - `Vgg19Features`: the frozen VGG19 convolution stack whose activations drive the perceptual
//!   loss during training.
//!
//! Both are plain Burn modules. Loss computation and checkpoint handling live in the `training`
//! crate.

pub mod style_net;
pub mod vgg;

pub use style_net::{
    check_input_size, reflection_pad2d, ConvLayer, ResidualBlock, StyleTransferNet, StyleTransferNetConfig,
    UpsampleLayer, INPUT_MULTIPLE, MIN_INPUT_SIDE,
};
pub use vgg::{
    torchvision_key_remaps, ParseVggLayerError, Vgg19Features, VggLayer, VggWeightsFormat,
    VGG_RGB_MEAN, VGG_RGB_STD,
};

pub mod prelude {
    pub use super::{StyleTransferNet, StyleTransferNetConfig, Vgg19Features, VggLayer};
}
