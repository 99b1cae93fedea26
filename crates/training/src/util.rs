use anyhow::Context;
use burn::backend::Autodiff;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use clap::Parser;
use cli_support::{parse_dims, validate_backend_choice, BackendKind};
use image_dataset::{
    image_to_tensor, index_images, load_image, BatchIter, DatasetConfig, ResizeMode,
};
use models::{StyleTransferNet, VggLayer};
use std::path::PathBuf;

use crate::checkpoint::{CheckpointManager, TrainingState};
use crate::config::TrainConfig;
use crate::loss::{LossBreakdown, LossNetwork, LossWeights, StyleTargets};
use crate::metrics::{MetricKind, MetricsSink};
use crate::TrainBackend;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "train",
    about = "Train a fast style transfer network against one style image"
)]
pub struct TrainArgs {
    /// TOML config (falls back to $STYLE_TRANSFER_CONFIG, then ./style-transfer.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// Folder of training photos.
    #[arg(long)]
    pub dataset_root: Option<PathBuf>,
    /// Style reference image.
    #[arg(long)]
    pub style_image: Option<PathBuf>,
    /// Pretrained VGG19 weights: torchvision `.pth` or a record from `convert_vgg`.
    #[arg(long)]
    pub vgg_weights: Option<PathBuf>,
    /// Use randomly initialised VGG features when no weights are configured.
    #[arg(long)]
    pub allow_random_vgg: bool,
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,
    /// Append JSONL metrics to this file.
    #[arg(long)]
    pub metrics_path: Option<PathBuf>,
    /// Training resolution, WIDTHxHEIGHT.
    #[arg(long, value_parser = parse_dims)]
    pub image_size: Option<(u32, u32)>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Use only the first N images.
    #[arg(long)]
    pub num_images: Option<usize>,
    #[arg(long)]
    pub steps_per_epoch: Option<usize>,
    #[arg(long)]
    pub epochs: Option<usize>,
    #[arg(long)]
    pub lr: Option<f64>,
    /// Save a checkpoint every N steps within an epoch.
    #[arg(long)]
    pub checkpoint_every: Option<usize>,
    #[arg(long)]
    pub content_weight: Option<f32>,
    #[arg(long)]
    pub style_weight: Option<f32>,
    #[arg(long)]
    pub tv_weight: Option<f32>,
    /// Comma-separated VGG layer names, e.g. block4_conv2.
    #[arg(long, value_delimiter = ',')]
    pub content_layers: Option<Vec<VggLayer>>,
    #[arg(long, value_delimiter = ',')]
    pub style_layers: Option<Vec<VggLayer>>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Fail on undecodable images instead of skipping them.
    #[arg(long)]
    pub strict: bool,
}

impl TrainArgs {
    /// Config file values with command-line overrides applied, validated.
    pub fn resolve_config(&self) -> anyhow::Result<TrainConfig> {
        let mut cfg = TrainConfig::load(self.config.as_deref())?;
        self.apply_overrides(&mut cfg);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_overrides(&self, cfg: &mut TrainConfig) {
        if let Some(v) = &self.dataset_root {
            cfg.dataset_root = v.clone();
        }
        if let Some(v) = &self.style_image {
            cfg.style_image = v.clone();
        }
        if let Some(v) = &self.vgg_weights {
            cfg.vgg_weights = Some(v.clone());
        }
        if self.allow_random_vgg {
            cfg.allow_random_vgg = true;
        }
        if let Some(v) = &self.checkpoint_dir {
            cfg.checkpoint_dir = v.clone();
        }
        if let Some(v) = &self.metrics_path {
            cfg.metrics_path = Some(v.clone());
        }
        if let Some(v) = self.image_size {
            cfg.image_size = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if self.num_images.is_some() {
            cfg.num_images = self.num_images;
        }
        if self.steps_per_epoch.is_some() {
            cfg.steps_per_epoch = self.steps_per_epoch;
        }
        if let Some(v) = self.epochs {
            cfg.epochs = v;
        }
        if let Some(v) = self.lr {
            cfg.lr = v;
        }
        if let Some(v) = self.checkpoint_every {
            cfg.checkpoint_every = v;
        }
        if let Some(v) = self.content_weight {
            cfg.loss.weights.content_weight = v;
        }
        if let Some(v) = self.style_weight {
            cfg.loss.weights.style_weight = v;
        }
        if let Some(v) = self.tv_weight {
            cfg.loss.weights.total_variation_weight = v;
        }
        // New layer lists reset their per-layer weights to 1.0.
        if let Some(layers) = &self.content_layers {
            cfg.loss.weights.content_layer_weights = vec![1.0; layers.len()];
            cfg.loss.content_layers = layers.clone();
        }
        if let Some(layers) = &self.style_layers {
            cfg.loss.weights.style_layer_weights = vec![1.0; layers.len()];
            cfg.loss.style_layers = layers.clone();
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if self.strict {
            cfg.permissive = false;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub resumed: bool,
    /// Epochs run by this invocation.
    pub epochs_run: usize,
    pub global_step: u64,
    /// Mean loss of every completed epoch, including ones from earlier runs.
    pub epoch_losses: Vec<f32>,
    pub skipped_images: usize,
    pub checkpoint_dir: PathBuf,
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<TrainReport> {
    validate_backend_choice(args.backend)?;
    let cfg = args.resolve_config()?;
    train_with_config(&cfg)
}

type ADBackend = Autodiff<TrainBackend>;

pub fn train_with_config(cfg: &TrainConfig) -> anyhow::Result<TrainReport> {
    cfg.validate()?;
    let device = <ADBackend as Backend>::Device::default();

    let paths = index_images(&cfg.dataset_root, cfg.num_images)
        .with_context(|| format!("failed to index {}", cfg.dataset_root.display()))?;
    if paths.len() < cfg.batch_size {
        anyhow::bail!(
            "{} images under {} but batch size is {}",
            paths.len(),
            cfg.dataset_root.display(),
            cfg.batch_size
        );
    }
    let steps_per_epoch = cfg
        .steps_per_epoch
        .unwrap_or(paths.len() / cfg.batch_size);
    tracing::info!(
        images = paths.len(),
        batch_size = cfg.batch_size,
        steps_per_epoch,
        "indexed {}",
        cfg.dataset_root.display()
    );

    let loss_net = LossNetwork::<ADBackend>::from_weights(
        cfg.vgg_weights.as_deref(),
        cfg.allow_random_vgg,
        cfg.loss.content_layers.clone(),
        cfg.loss.style_layers.clone(),
        &device,
    )?;
    let style = load_image(&cfg.style_image, Some(cfg.image_size), ResizeMode::Force)
        .with_context(|| format!("failed to load style image {}", cfg.style_image.display()))?;
    let style_targets = loss_net.style_targets(image_to_tensor::<ADBackend>(&style, &device));

    let ckpt = CheckpointManager::new(&cfg.checkpoint_dir)?;
    let resumed = ckpt.has_checkpoint();
    let (mut model, model_cfg, mut state) = if resumed {
        let (model, saved_cfg) = ckpt.load_model::<ADBackend>(&device)?;
        let state = ckpt.load_state()?;
        if saved_cfg != cfg.model {
            tracing::warn!("checkpoint network config differs from the configured one; keeping the checkpoint's");
        }
        tracing::info!(
            epoch = state.epoch,
            step = state.global_step,
            "resuming from {}",
            ckpt.weights_path().display()
        );
        (model, saved_cfg, state)
    } else {
        tracing::info!("no checkpoint in {}; training from scratch", ckpt.dir().display());
        (
            StyleTransferNet::<ADBackend>::new(cfg.model.clone(), &device),
            cfg.model.clone(),
            TrainingState::default(),
        )
    };

    let mut report = TrainReport {
        resumed,
        epochs_run: 0,
        global_step: state.global_step,
        epoch_losses: state.epoch_losses.clone(),
        skipped_images: 0,
        checkpoint_dir: cfg.checkpoint_dir.clone(),
    };
    if state.epoch >= cfg.epochs {
        tracing::info!(
            "checkpoint already covers {} of {} epochs; nothing to do",
            state.epoch,
            cfg.epochs
        );
        return Ok(report);
    }

    let mut batches = BatchIter::new(
        paths,
        DatasetConfig {
            target_size: cfg.image_size,
            shuffle: cfg.shuffle,
            seed: cfg.seed,
            drop_last: true,
            repeat: true,
            permissive: cfg.permissive,
            ..Default::default()
        },
    );
    let mut optim = AdamConfig::new().init();
    let mut metrics = MetricsSink::open(cfg.metrics_path.as_deref());

    for epoch in state.epoch + 1..=cfg.epochs {
        let mut losses = Vec::with_capacity(steps_per_epoch);
        let mut last = LossBreakdown::default();
        for step in 1..=steps_per_epoch {
            let batch = batches
                .next_batch::<ADBackend>(cfg.batch_size, &device)?
                .ok_or_else(|| anyhow::anyhow!("batch iterator ended unexpectedly"))?;
            let (next, parts) = train_step(
                model,
                &mut optim,
                &loss_net,
                &style_targets,
                batch.images,
                &cfg.loss.weights,
                cfg.lr,
            );
            model = next;
            state.global_step += 1;
            losses.push(parts.total);
            last = parts;

            if step % cfg.checkpoint_every == 0 {
                let running = mean(&losses);
                ckpt.save(&model, &model_cfg, &state)?;
                tracing::info!(
                    epoch,
                    step,
                    loss = running,
                    content = last.content,
                    style = last.style,
                    tv = last.total_variation,
                    "checkpoint saved"
                );
                metrics.record(MetricKind::Checkpoint, epoch, state.global_step, running, &last);
            }
        }

        let epoch_loss = mean(&losses);
        state.epoch = epoch;
        state.epoch_losses.push(epoch_loss);
        ckpt.save(&model, &model_cfg, &state)?;
        metrics.record(MetricKind::Epoch, epoch, state.global_step, epoch_loss, &last);
        tracing::info!(epoch, loss = epoch_loss, "epoch complete");
        report.epochs_run += 1;
    }

    report.global_step = state.global_step;
    report.epoch_losses = state.epoch_losses;
    report.skipped_images = batches.skipped_errors();
    Ok(report)
}

/// One optimisation step: forward, perceptual + total-variation loss, backward, Adam update.
pub fn train_step<B, O>(
    model: StyleTransferNet<B>,
    optim: &mut O,
    loss_net: &LossNetwork<B>,
    style_targets: &StyleTargets<B>,
    images: Tensor<B, 4>,
    weights: &LossWeights,
    lr: f64,
) -> (StyleTransferNet<B>, LossBreakdown)
where
    B: AutodiffBackend,
    O: Optimizer<StyleTransferNet<B>, B>,
{
    let output = model.forward(images.clone());
    let loss = loss_net.step_loss(output, images, style_targets, weights);
    let parts = loss.breakdown();
    let grads = GradientsParams::from_grads(loss.total.backward(), &model);
    (optim.step(lr, model, grads), parts)
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_file_values() {
        let args = TrainArgs::parse_from([
            "train",
            "--epochs",
            "5",
            "--image-size",
            "64x32",
            "--style-layers",
            "block1_conv1,block2_conv1",
            "--tv-weight",
            "0.5",
            "--strict",
        ]);
        let mut cfg = TrainConfig::default();
        args.apply_overrides(&mut cfg);
        assert_eq!(cfg.epochs, 5);
        assert_eq!(cfg.image_size, (64, 32));
        assert_eq!(
            cfg.loss.style_layers,
            vec![VggLayer::Block1Conv1, VggLayer::Block2Conv1]
        );
        assert_eq!(cfg.loss.weights.style_layer_weights, vec![1.0, 1.0]);
        assert_eq!(cfg.loss.weights.total_variation_weight, 0.5);
        assert!(!cfg.permissive);
        cfg.validate().unwrap();
    }

    #[test]
    fn unknown_layer_names_are_rejected() {
        let res = TrainArgs::try_parse_from(["train", "--style-layers", "block9_conv9"]);
        assert!(res.is_err());
    }

    #[test]
    fn train_step_updates_parameters_on_a_fixed_batch() {
        use burn::tensor::Distribution;

        type B = Autodiff<burn_ndarray::NdArray<f32>>;
        let device = Default::default();
        let model = StyleTransferNet::<B>::new(
            models::StyleTransferNetConfig {
                base_channels: 2,
                residual_blocks: 1,
                ..Default::default()
            },
            &device,
        );
        let loss_net = LossNetwork::<B>::from_weights(
            None,
            true,
            vec![VggLayer::Block1Conv2],
            vec![VggLayer::Block1Conv1],
            &device,
        )
        .unwrap();
        let style = Tensor::<B, 4>::random([1, 3, 16, 16], Distribution::Uniform(0.0, 1.0), &device);
        let targets = loss_net.style_targets(style);
        let batch = Tensor::<B, 4>::random([2, 3, 16, 16], Distribution::Uniform(0.0, 1.0), &device);
        let weights = LossWeights {
            content_layer_weights: vec![1.0],
            style_layer_weights: vec![1.0],
            ..Default::default()
        };
        let mut optim = AdamConfig::new().init();

        let before = model
            .forward(batch.clone())
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        let (model, parts) = train_step(
            model,
            &mut optim,
            &loss_net,
            &targets,
            batch.clone(),
            &weights,
            1e-2,
        );
        let after = model.forward(batch).into_data().to_vec::<f32>().unwrap();

        assert!(parts.total.is_finite() && parts.total > 0.0);
        let max_delta = before
            .iter()
            .zip(&after)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_delta > 1e-4, "one step left the network unchanged");
    }

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[1.0, 3.0]), 2.0);
    }
}
