//! VGG19 convolution stack used as a frozen perceptual-loss backbone.
//!
//! Only the layers up to `block5_conv1` are materialised; the classifier head and the deeper
//! block-5 convolutions never contribute to the loss. Pretrained weights come from torchvision's
//! ImageNet `vgg19` state dict (`.pth`), either directly or after conversion to a Burn record with
//! the `convert_vgg` tool (see `Vgg19Features::load`).

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder, RecorderError};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::module::max_pool2d;
use burn::tensor::Tensor;
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// ImageNet RGB channel statistics the torchvision weights were trained with, on the [0, 1] scale.
pub const VGG_RGB_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const VGG_RGB_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Index of each layer inside torchvision's `vgg19().features` sequential, in forward order.
const TORCHVISION_FEATURE_INDEX: [usize; 13] = [0, 2, 5, 7, 10, 12, 14, 16, 19, 21, 23, 25, 28];

/// How a weights file is read, chosen from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VggWeightsFormat {
    /// torchvision state dict (`.pth` / `.pt`).
    PyTorch,
    /// Burn record written by `BinFileRecorder<FullPrecisionSettings>`.
    BurnRecord,
}

impl VggWeightsFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("pth") || ext.eq_ignore_ascii_case("pt") => {
                VggWeightsFormat::PyTorch
            }
            _ => VggWeightsFormat::BurnRecord,
        }
    }
}

/// Regex remaps from torchvision keys (`features.21.weight`) to field names (`conv4_2.weight`).
pub fn torchvision_key_remaps() -> Vec<(String, String)> {
    VggLayer::ALL
        .iter()
        .zip(TORCHVISION_FEATURE_INDEX)
        .map(|(layer, idx)| (format!("^features\\.{idx}\\.(.+)$"), format!("{}.$1", layer.field())))
        .collect()
}

/// A VGG19 convolution layer, named the way Keras names it (`block4_conv2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VggLayer {
    Block1Conv1,
    Block1Conv2,
    Block2Conv1,
    Block2Conv2,
    Block3Conv1,
    Block3Conv2,
    Block3Conv3,
    Block3Conv4,
    Block4Conv1,
    Block4Conv2,
    Block4Conv3,
    Block4Conv4,
    Block5Conv1,
}

impl VggLayer {
    /// Every layer in forward order.
    pub const ALL: [VggLayer; 13] = [
        VggLayer::Block1Conv1,
        VggLayer::Block1Conv2,
        VggLayer::Block2Conv1,
        VggLayer::Block2Conv2,
        VggLayer::Block3Conv1,
        VggLayer::Block3Conv2,
        VggLayer::Block3Conv3,
        VggLayer::Block3Conv4,
        VggLayer::Block4Conv1,
        VggLayer::Block4Conv2,
        VggLayer::Block4Conv3,
        VggLayer::Block4Conv4,
        VggLayer::Block5Conv1,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VggLayer::Block1Conv1 => "block1_conv1",
            VggLayer::Block1Conv2 => "block1_conv2",
            VggLayer::Block2Conv1 => "block2_conv1",
            VggLayer::Block2Conv2 => "block2_conv2",
            VggLayer::Block3Conv1 => "block3_conv1",
            VggLayer::Block3Conv2 => "block3_conv2",
            VggLayer::Block3Conv3 => "block3_conv3",
            VggLayer::Block3Conv4 => "block3_conv4",
            VggLayer::Block4Conv1 => "block4_conv1",
            VggLayer::Block4Conv2 => "block4_conv2",
            VggLayer::Block4Conv3 => "block4_conv3",
            VggLayer::Block4Conv4 => "block4_conv4",
            VggLayer::Block5Conv1 => "block5_conv1",
        }
    }

    /// Output channels of the layer.
    pub fn channels(self) -> usize {
        match self.block() {
            1 => 64,
            2 => 128,
            3 => 256,
            _ => 512,
        }
    }

    /// 1-based block index; each block after the first starts with a 2x2 max-pool.
    pub fn block(self) -> usize {
        match self {
            VggLayer::Block1Conv1 | VggLayer::Block1Conv2 => 1,
            VggLayer::Block2Conv1 | VggLayer::Block2Conv2 => 2,
            VggLayer::Block3Conv1
            | VggLayer::Block3Conv2
            | VggLayer::Block3Conv3
            | VggLayer::Block3Conv4 => 3,
            VggLayer::Block4Conv1
            | VggLayer::Block4Conv2
            | VggLayer::Block4Conv3
            | VggLayer::Block4Conv4 => 4,
            VggLayer::Block5Conv1 => 5,
        }
    }

    /// Field name of the layer inside `Vgg19Features` (`conv4_2`).
    pub fn field(self) -> String {
        let idx = VggLayer::ALL.iter().position(|l| *l == self).unwrap_or(0);
        let block = self.block();
        let first = VggLayer::ALL
            .iter()
            .position(|l| l.block() == block)
            .unwrap_or(0);
        format!("conv{block}_{}", idx - first + 1)
    }

    fn starts_block(self) -> bool {
        matches!(
            self,
            VggLayer::Block2Conv1
                | VggLayer::Block3Conv1
                | VggLayer::Block4Conv1
                | VggLayer::Block5Conv1
        )
    }
}

impl fmt::Display for VggLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVggLayerError(pub String);

impl fmt::Display for ParseVggLayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown VGG19 layer '{}'", self.0)
    }
}

impl std::error::Error for ParseVggLayerError {}

impl FromStr for VggLayer {
    type Err = ParseVggLayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        VggLayer::ALL
            .iter()
            .copied()
            .find(|layer| layer.name() == wanted)
            .ok_or_else(|| ParseVggLayerError(wanted.to_string()))
    }
}

impl TryFrom<String> for VggLayer {
    type Error = ParseVggLayerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VggLayer> for String {
    fn from(layer: VggLayer) -> Self {
        layer.name().to_string()
    }
}

#[derive(Module, Debug)]
pub struct Vgg19Features<B: Backend> {
    // Block 1
    conv1_1: Conv2d<B>,
    conv1_2: Conv2d<B>,
    // Block 2
    conv2_1: Conv2d<B>,
    conv2_2: Conv2d<B>,
    // Block 3
    conv3_1: Conv2d<B>,
    conv3_2: Conv2d<B>,
    conv3_3: Conv2d<B>,
    conv3_4: Conv2d<B>,
    // Block 4
    conv4_1: Conv2d<B>,
    conv4_2: Conv2d<B>,
    conv4_3: Conv2d<B>,
    conv4_4: Conv2d<B>,
    // Block 5
    conv5_1: Conv2d<B>,
}

impl<B: Backend> Vgg19Features<B> {
    /// Randomly initialised stack; call `load` for pretrained weights.
    pub fn new(device: &B::Device) -> Self {
        let conv = |in_ch, out_ch| {
            Conv2dConfig::new([in_ch, out_ch], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(true)
                .init(device)
        };

        Self {
            conv1_1: conv(3, 64),
            conv1_2: conv(64, 64),
            conv2_1: conv(64, 128),
            conv2_2: conv(128, 128),
            conv3_1: conv(128, 256),
            conv3_2: conv(256, 256),
            conv3_3: conv(256, 256),
            conv3_4: conv(256, 256),
            conv4_1: conv(256, 512),
            conv4_2: conv(512, 512),
            conv4_3: conv(512, 512),
            conv4_4: conv(512, 512),
            conv5_1: conv(512, 512),
        }
    }

    /// Load pretrained weights. `.pth`/`.pt` files are read as torchvision state dicts, anything
    /// else as a Burn record.
    pub fn load<P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Self, RecorderError> {
        let path = path.as_ref();
        match VggWeightsFormat::from_path(path) {
            VggWeightsFormat::PyTorch => Self::load_pytorch(path, device),
            VggWeightsFormat::BurnRecord => {
                let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
                Self::new(device).load_file(path.to_path_buf(), &recorder, device)
            }
        }
    }

    /// Import torchvision's `vgg19` ImageNet weights; classifier keys are ignored.
    pub fn load_pytorch(path: &Path, device: &B::Device) -> Result<Self, RecorderError> {
        let args = torchvision_key_remaps()
            .into_iter()
            .fold(LoadArgs::new(path.to_path_buf()), |args, (from, to)| {
                args.with_key_remap(&from, &to)
            });
        let record: Vgg19FeaturesRecord<B> =
            PyTorchFileRecorder::<FullPrecisionSettings>::default().load(args, device)?;
        Ok(Self::new(device).load_record(record))
    }

    fn conv(&self, layer: VggLayer) -> &Conv2d<B> {
        match layer {
            VggLayer::Block1Conv1 => &self.conv1_1,
            VggLayer::Block1Conv2 => &self.conv1_2,
            VggLayer::Block2Conv1 => &self.conv2_1,
            VggLayer::Block2Conv2 => &self.conv2_2,
            VggLayer::Block3Conv1 => &self.conv3_1,
            VggLayer::Block3Conv2 => &self.conv3_2,
            VggLayer::Block3Conv3 => &self.conv3_3,
            VggLayer::Block3Conv4 => &self.conv3_4,
            VggLayer::Block4Conv1 => &self.conv4_1,
            VggLayer::Block4Conv2 => &self.conv4_2,
            VggLayer::Block4Conv3 => &self.conv4_3,
            VggLayer::Block4Conv4 => &self.conv4_4,
            VggLayer::Block5Conv1 => &self.conv5_1,
        }
    }

    /// Normalize RGB in [0, 1] with the ImageNet statistics the pretrained weights expect.
    pub fn preprocess(x: Tensor<B, 4>) -> Tensor<B, 4> {
        let device = x.device();
        let mean = Tensor::<B, 1>::from_floats(VGG_RGB_MEAN, &device).reshape([1, 3, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(VGG_RGB_STD, &device).reshape([1, 3, 1, 1]);
        (x - mean) / std
    }

    /// Post-ReLU activations of `layers`, in the order requested. Input must already be
    /// preprocessed. Layers past the deepest requested one are skipped.
    pub fn forward_layers(&self, x: Tensor<B, 4>, layers: &[VggLayer]) -> Vec<Tensor<B, 4>> {
        let Some(deepest) = layers.iter().max().copied() else {
            return Vec::new();
        };
        let mut captured: Vec<Option<Tensor<B, 4>>> = vec![None; layers.len()];
        let mut x = x;
        for layer in VggLayer::ALL {
            if layer.starts_block() {
                x = max_pool2d(x, [2, 2], [2, 2], [0, 0], [1, 1]);
            }
            x = relu(self.conv(layer).forward(x));
            for (slot, wanted) in captured.iter_mut().zip(layers) {
                if *wanted == layer {
                    *slot = Some(x.clone());
                }
            }
            if layer == deepest {
                break;
            }
        }
        captured.into_iter().flatten().collect()
    }
}
