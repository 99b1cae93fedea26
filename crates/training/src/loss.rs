//! Perceptual loss: content and Gram-matrix style terms measured on frozen VGG19 activations,
//! plus a total-variation smoothness penalty on the stylized output.

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use models::{Vgg19Features, VggLayer};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossWeights {
    pub content_weight: f32,
    pub style_weight: f32,
    pub total_variation_weight: f32,
    pub content_layer_weights: Vec<f32>,
    pub style_layer_weights: Vec<f32>,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            content_weight: 1e1,
            style_weight: 1e2,
            total_variation_weight: 0.004,
            content_layer_weights: vec![1.0],
            style_layer_weights: vec![1.0; 5],
        }
    }
}

/// Scalar loss components of one step, read back from the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LossBreakdown {
    pub content: f32,
    pub style: f32,
    pub total_variation: f32,
    pub total: f32,
}

/// Loss tensors of one step. `total` is the one to differentiate.
#[derive(Debug, Clone)]
pub struct StepLoss<B: Backend> {
    pub content: Tensor<B, 1>,
    pub style: Tensor<B, 1>,
    pub total_variation: Tensor<B, 1>,
    pub total: Tensor<B, 1>,
}

impl<B: Backend> StepLoss<B> {
    pub fn breakdown(&self) -> LossBreakdown {
        LossBreakdown {
            content: scalar(self.content.clone()),
            style: scalar(self.style.clone()),
            total_variation: scalar(self.total_variation.clone()),
            total: scalar(self.total.clone()),
        }
    }
}

pub(crate) fn scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
    t.detach()
        .into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .next()
        .unwrap_or(0.0)
}

/// Channel correlations of `[b, c, h, w]` activations, normalized by `c * h * w`.
pub fn gram_matrix<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 3> {
    let [batch, channels, height, width] = x.dims();
    let features = x.reshape([batch, channels, height * width]);
    features
        .clone()
        .matmul(features.swap_dims(1, 2))
        .div_scalar((channels * height * width) as f32)
}

pub fn content_loss<B: Backend>(pred: Tensor<B, 4>, target: Tensor<B, 4>, weight: f32) -> Tensor<B, 1> {
    assert_eq!(
        pred.dims(),
        target.dims(),
        "content activations must share a shape"
    );
    (pred - target).powf_scalar(2.0).mean().mul_scalar(weight)
}

/// `target_gram` may have a batch of 1; it broadcasts over the prediction batch.
pub fn style_loss<B: Backend>(pred: Tensor<B, 4>, target_gram: Tensor<B, 3>, weight: f32) -> Tensor<B, 1> {
    let pred_gram = gram_matrix(pred);
    let pred_dims = pred_gram.dims();
    let target_dims = target_gram.dims();
    assert_eq!(
        pred_dims[1..],
        target_dims[1..],
        "style Gram matrices must share a channel count"
    );
    (target_gram - pred_gram).powf_scalar(2.0).mean().mul_scalar(weight)
}

/// Sum of absolute differences between vertical and horizontal neighbours, one value per image.
pub fn total_variation<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 1> {
    let [batch, channels, height, width] = images.dims();
    assert!(
        height > 1 && width > 1,
        "total variation needs at least 2x2 images, got {height}x{width}"
    );
    let dv = images.clone().narrow(2, 1, height - 1) - images.clone().narrow(2, 0, height - 1);
    let dh = images.clone().narrow(3, 1, width - 1) - images.narrow(3, 0, width - 1);
    let v = dv
        .abs()
        .reshape([batch, channels * (height - 1) * width])
        .sum_dim(1);
    let h = dh
        .abs()
        .reshape([batch, channels * height * (width - 1)])
        .sum_dim(1);
    (v + h).reshape([batch])
}

/// Activations of the configured content and style layers, in configuration order.
#[derive(Debug, Clone)]
pub struct Activations<B: Backend> {
    pub content: Vec<Tensor<B, 4>>,
    pub style: Vec<Tensor<B, 4>>,
}

/// Gram matrices of the style image, one per style layer, detached from the graph.
#[derive(Debug, Clone)]
pub struct StyleTargets<B: Backend> {
    pub grams: Vec<Tensor<B, 3>>,
}

/// `content_weight * Σ content terms + style_weight * Σ style terms`.
pub fn perceptual_loss<B: Backend>(
    pred: &Activations<B>,
    content_targets: &[Tensor<B, 4>],
    style_targets: &StyleTargets<B>,
    weights: &LossWeights,
) -> (Tensor<B, 1>, Tensor<B, 1>) {
    assert_eq!(pred.content.len(), content_targets.len());
    assert_eq!(pred.content.len(), weights.content_layer_weights.len());
    assert_eq!(pred.style.len(), style_targets.grams.len());
    assert_eq!(pred.style.len(), weights.style_layer_weights.len());

    let content = pred
        .content
        .iter()
        .zip(content_targets)
        .zip(&weights.content_layer_weights)
        .map(|((p, t), w)| content_loss(p.clone(), t.clone(), *w))
        .reduce(|a, b| a + b);
    let style = pred
        .style
        .iter()
        .zip(&style_targets.grams)
        .zip(&weights.style_layer_weights)
        .map(|((p, g), w)| style_loss(p.clone(), g.clone(), *w))
        .reduce(|a, b| a + b);

    let device = pred
        .style
        .first()
        .or(pred.content.first())
        .map(|t| t.device())
        .unwrap_or_default();
    let content = content.unwrap_or_else(|| Tensor::zeros([1], &device));
    let style = style.unwrap_or_else(|| Tensor::zeros([1], &device));
    (
        content.mul_scalar(weights.content_weight),
        style.mul_scalar(weights.style_weight),
    )
}

/// Frozen VGG19 plus the layers the loss reads from.
#[derive(Debug)]
pub struct LossNetwork<B: Backend> {
    vgg: Vgg19Features<B>,
    content_layers: Vec<VggLayer>,
    style_layers: Vec<VggLayer>,
    layers: Vec<VggLayer>,
}

impl<B: Backend> LossNetwork<B> {
    pub fn new(
        vgg: Vgg19Features<B>,
        content_layers: Vec<VggLayer>,
        style_layers: Vec<VggLayer>,
    ) -> Self {
        let layers = style_layers
            .iter()
            .chain(content_layers.iter())
            .copied()
            .collect();
        Self {
            vgg: vgg.no_grad(),
            content_layers,
            style_layers,
            layers,
        }
    }

    /// Load pretrained VGG19 weights (`.pth` or Burn record). Without a path this is an error
    /// unless `allow_random` opts into randomly initialised features.
    pub fn from_weights(
        weights: Option<&Path>,
        allow_random: bool,
        content_layers: Vec<VggLayer>,
        style_layers: Vec<VggLayer>,
        device: &B::Device,
    ) -> anyhow::Result<Self> {
        let vgg = match weights {
            Some(path) => Vgg19Features::load(path, device).map_err(|e| {
                anyhow::anyhow!("failed to load VGG19 weights from {}: {e}", path.display())
            })?,
            None if allow_random => {
                tracing::warn!(
                    "no VGG19 weights configured; perceptual loss uses randomly initialised features"
                );
                Vgg19Features::new(device)
            }
            None => anyhow::bail!(
                "no VGG19 weights configured; set vgg_weights to torchvision's vgg19 .pth (or a \
                 record from convert_vgg), or pass --allow-random-vgg"
            ),
        };
        Ok(Self::new(vgg, content_layers, style_layers))
    }

    pub fn content_layers(&self) -> &[VggLayer] {
        &self.content_layers
    }

    pub fn style_layers(&self) -> &[VggLayer] {
        &self.style_layers
    }

    /// Activations of RGB images in [0, 1].
    pub fn activations(&self, images: Tensor<B, 4>) -> Activations<B> {
        let mut style = self
            .vgg
            .forward_layers(Vgg19Features::preprocess(images), &self.layers);
        let content = style.split_off(self.style_layers.len());
        Activations { content, style }
    }

    /// Content-layer activations only, detached; used for the content targets.
    pub fn content_targets(&self, images: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        self.vgg
            .forward_layers(Vgg19Features::preprocess(images), &self.content_layers)
            .into_iter()
            .map(|t| t.detach())
            .collect()
    }

    /// Gram targets of a style image in [0, 1].
    pub fn style_targets(&self, style_image: Tensor<B, 4>) -> StyleTargets<B> {
        let grams = self
            .vgg
            .forward_layers(Vgg19Features::preprocess(style_image), &self.style_layers)
            .into_iter()
            .map(|act| gram_matrix(act).detach())
            .collect();
        StyleTargets { grams }
    }

    /// Full step loss for a network `output` on the 0..255 scale and its `input` in [0, 1].
    pub fn step_loss(
        &self,
        output: Tensor<B, 4>,
        input: Tensor<B, 4>,
        style_targets: &StyleTargets<B>,
        weights: &LossWeights,
    ) -> StepLoss<B> {
        let output = output.clamp(0.0, 255.0);
        let pred = self.activations(output.clone().div_scalar(255.0));
        let content_targets = self.content_targets(input.detach());
        let (content, style) = perceptual_loss(&pred, &content_targets, style_targets, weights);
        let total_variation = total_variation(output)
            .mean()
            .mul_scalar(weights.total_variation_weight);
        let total = content.clone() + style.clone() + total_variation.clone();
        StepLoss {
            content,
            style,
            total_variation,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Distribution, TensorData};

    type TestBackend = burn_ndarray::NdArray<f32>;

    fn values(t: Tensor<TestBackend, 1>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn gram_matrix_of_known_features() {
        let device = Default::default();
        // Two channels over a 1x2 image: [1, 2] and [3, 4].
        let x = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0], [1, 2, 1, 2]),
            &device,
        );
        let gram = gram_matrix(x).into_data().to_vec::<f32>().unwrap();
        // [[1*1+2*2, 1*3+2*4], [.., 3*3+4*4]] / (2*1*2)
        assert_eq!(gram, vec![1.25, 2.75, 2.75, 6.25]);
    }

    #[test]
    fn content_loss_is_weighted_mse() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 4>::zeros([1, 1, 2, 2], &device);
        let b = Tensor::<TestBackend, 4>::ones([1, 1, 2, 2], &device).mul_scalar(2.0);
        assert_eq!(values(content_loss(a.clone(), b, 0.5)), vec![2.0]);
        assert_eq!(values(content_loss(a.clone(), a, 3.0)), vec![0.0]);
    }

    #[test]
    fn style_loss_vanishes_for_matching_statistics() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::random([1, 4, 3, 3], Distribution::Default, &device);
        let target = gram_matrix(x.clone());
        let batch = Tensor::cat(vec![x.clone(), x], 0);
        let loss = values(style_loss(batch, target, 1.0))[0];
        assert!(loss.abs() < 1e-6);
    }

    #[test]
    fn total_variation_per_image() {
        let device = Default::default();
        let flat = Tensor::<TestBackend, 4>::ones([2, 3, 4, 4], &device);
        assert_eq!(values(total_variation(flat)), vec![0.0, 0.0]);

        // Single channel 2x2: [[0, 1], [2, 4]] -> vertical |2|+|3|, horizontal |1|+|2|.
        let x = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![0.0f32, 1.0, 2.0, 4.0], [1, 1, 2, 2]),
            &device,
        );
        assert_eq!(values(total_variation(x)), vec![8.0]);
    }

    #[test]
    fn perceptual_loss_applies_global_and_layer_weights() {
        let device = Default::default();
        let zeros = Tensor::<TestBackend, 4>::zeros([1, 1, 2, 2], &device);
        let ones = Tensor::<TestBackend, 4>::ones([1, 1, 2, 2], &device);
        let pred = Activations {
            content: vec![ones.clone()],
            style: vec![ones.clone(), ones],
        };
        let targets = StyleTargets {
            grams: vec![gram_matrix(zeros.clone()), gram_matrix(zeros.clone())],
        };
        let weights = LossWeights {
            content_weight: 10.0,
            style_weight: 100.0,
            total_variation_weight: 0.0,
            content_layer_weights: vec![0.5],
            style_layer_weights: vec![1.0, 2.0],
        };
        let (content, style) = perceptual_loss(&pred, &[zeros], &targets, &weights);
        // content: 10 * 0.5 * mean(1) ; gram(ones 1x2x2) = 4/4 = 1 -> style: 100 * (1 + 2) * 1
        assert_eq!(values(content), vec![5.0]);
        assert_eq!(values(style), vec![300.0]);
    }

    #[test]
    fn missing_vgg_weights_need_explicit_opt_in() {
        let device = Default::default();
        let content = vec![VggLayer::Block1Conv2];
        let style = vec![VggLayer::Block1Conv1];
        let err = LossNetwork::<TestBackend>::from_weights(None, false, content.clone(), style.clone(), &device)
            .unwrap_err();
        assert!(err.to_string().contains("--allow-random-vgg"), "{err}");
        assert!(LossNetwork::<TestBackend>::from_weights(None, true, content, style, &device).is_ok());
    }
}
