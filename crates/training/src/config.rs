use anyhow::Context;
use models::{StyleTransferNetConfig, VggLayer};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::loss::LossWeights;

pub const DEFAULT_CONFIG_NAME: &str = "style-transfer.toml";
pub const CONFIG_ENV: &str = "STYLE_TRANSFER_CONFIG";

#[derive(Debug, Clone, PartialEq)]
pub struct LossConfig {
    pub content_layers: Vec<VggLayer>,
    pub style_layers: Vec<VggLayer>,
    pub weights: LossWeights,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            content_layers: vec![VggLayer::Block4Conv2],
            style_layers: vec![
                VggLayer::Block1Conv1,
                VggLayer::Block2Conv1,
                VggLayer::Block3Conv1,
                VggLayer::Block4Conv1,
                VggLayer::Block5Conv1,
            ],
            weights: LossWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    /// Flat folder of training photos (e.g. COCO `train2014/`).
    pub dataset_root: PathBuf,
    pub style_image: PathBuf,
    /// Pretrained VGG19 record; random features when absent.
    pub vgg_weights: Option<PathBuf>,
    /// Train against randomly initialised VGG features when `vgg_weights` is unset.
    pub allow_random_vgg: bool,
    pub checkpoint_dir: PathBuf,
    pub metrics_path: Option<PathBuf>,
    /// Training resolution (width, height); the style image is resized to it as well.
    pub image_size: (u32, u32),
    pub batch_size: usize,
    /// Use only the first N images (sorted by name).
    pub num_images: Option<usize>,
    /// Defaults to `images / batch_size`.
    pub steps_per_epoch: Option<usize>,
    pub epochs: usize,
    pub lr: f64,
    /// Save a checkpoint every N steps within an epoch.
    pub checkpoint_every: usize,
    pub shuffle: bool,
    pub seed: Option<u64>,
    /// Skip undecodable training images instead of failing.
    pub permissive: bool,
    pub model: StyleTransferNetConfig,
    pub loss: LossConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("assets/coco/train2014"),
            style_image: PathBuf::from("assets/styles/style.jpg"),
            vgg_weights: None,
            allow_random_vgg: false,
            checkpoint_dir: PathBuf::from("checkpoints/style"),
            metrics_path: None,
            image_size: (256, 256),
            batch_size: 4,
            num_images: None,
            steps_per_epoch: None,
            epochs: 2,
            lr: 1e-3,
            checkpoint_every: 1000,
            shuffle: true,
            seed: None,
            permissive: true,
            model: StyleTransferNetConfig::default(),
            loss: LossConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TrainConfigFile {
    dataset_root: Option<String>,
    style_image: Option<String>,
    vgg_weights: Option<String>,
    allow_random_vgg: Option<bool>,
    checkpoint_dir: Option<String>,
    metrics_path: Option<String>,
    data: Option<DataSection>,
    schedule: Option<ScheduleSection>,
    loss: Option<LossSection>,
    model: Option<StyleTransferNetConfig>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DataSection {
    image_size: Option<[u32; 2]>,
    batch_size: Option<usize>,
    num_images: Option<usize>,
    shuffle: Option<bool>,
    seed: Option<u64>,
    permissive: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ScheduleSection {
    epochs: Option<usize>,
    lr: Option<f64>,
    steps_per_epoch: Option<usize>,
    checkpoint_every: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LossSection {
    content_weight: Option<f32>,
    style_weight: Option<f32>,
    total_variation_weight: Option<f32>,
    content_layers: Option<Vec<VggLayer>>,
    style_layers: Option<Vec<VggLayer>>,
    content_layer_weights: Option<Vec<f32>>,
    style_layer_weights: Option<Vec<f32>>,
}

impl TrainConfig {
    /// Explicit path, then `$STYLE_TRANSFER_CONFIG`, then `./style-transfer.toml`, then defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_path(Path::new(&path));
        }
        let default = Path::new(DEFAULT_CONFIG_NAME);
        if default.exists() {
            return Self::from_path(default);
        }
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let file: TrainConfigFile = toml::from_str(raw)?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: TrainConfigFile) -> Self {
        let defaults = Self::default();
        let data = file.data.unwrap_or_default();
        let schedule = file.schedule.unwrap_or_default();
        let loss = file.loss.unwrap_or_default();
        let default_loss = defaults.loss.clone();

        let content_layers = loss.content_layers.unwrap_or(default_loss.content_layers);
        let style_layers = loss.style_layers.unwrap_or(default_loss.style_layers);
        // Layer weights default to 1.0 per configured layer.
        let content_layer_weights = loss
            .content_layer_weights
            .unwrap_or_else(|| vec![1.0; content_layers.len()]);
        let style_layer_weights = loss
            .style_layer_weights
            .unwrap_or_else(|| vec![1.0; style_layers.len()]);

        TrainConfig {
            dataset_root: file
                .dataset_root
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.dataset_root),
            style_image: file
                .style_image
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.style_image),
            vgg_weights: file.vgg_weights.map(|v| expand_path(&v)),
            allow_random_vgg: file.allow_random_vgg.unwrap_or(defaults.allow_random_vgg),
            checkpoint_dir: file
                .checkpoint_dir
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.checkpoint_dir),
            metrics_path: file.metrics_path.map(|v| expand_path(&v)),
            image_size: data
                .image_size
                .map(|[w, h]| (w, h))
                .unwrap_or(defaults.image_size),
            batch_size: data.batch_size.unwrap_or(defaults.batch_size),
            num_images: data.num_images,
            steps_per_epoch: schedule.steps_per_epoch,
            epochs: schedule.epochs.unwrap_or(defaults.epochs),
            lr: schedule.lr.unwrap_or(defaults.lr),
            checkpoint_every: schedule
                .checkpoint_every
                .unwrap_or(defaults.checkpoint_every),
            shuffle: data.shuffle.unwrap_or(defaults.shuffle),
            seed: data.seed,
            permissive: data.permissive.unwrap_or(defaults.permissive),
            model: file.model.unwrap_or(defaults.model),
            loss: LossConfig {
                content_layers,
                style_layers,
                weights: LossWeights {
                    content_weight: loss
                        .content_weight
                        .unwrap_or(default_loss.weights.content_weight),
                    style_weight: loss
                        .style_weight
                        .unwrap_or(default_loss.weights.style_weight),
                    total_variation_weight: loss
                        .total_variation_weight
                        .unwrap_or(default_loss.weights.total_variation_weight),
                    content_layer_weights,
                    style_layer_weights,
                },
            },
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be > 0");
        }
        if self.epochs == 0 {
            anyhow::bail!("epochs must be > 0");
        }
        if self.checkpoint_every == 0 {
            anyhow::bail!("checkpoint_every must be > 0");
        }
        if self.steps_per_epoch == Some(0) {
            anyhow::bail!("steps_per_epoch must be > 0 when set");
        }
        let (w, h) = self.image_size;
        if w < 16 || h < 16 || w % 4 != 0 || h % 4 != 0 {
            anyhow::bail!("image_size must be at least 16x16 with both sides multiples of 4, got {w}x{h}");
        }
        if self.loss.style_layers.is_empty() {
            anyhow::bail!("at least one style layer is required");
        }
        if self.loss.content_layers.len() != self.loss.weights.content_layer_weights.len() {
            anyhow::bail!(
                "{} content layers but {} content layer weights",
                self.loss.content_layers.len(),
                self.loss.weights.content_layer_weights.len()
            );
        }
        if self.loss.style_layers.len() != self.loss.weights.style_layer_weights.len() {
            anyhow::bail!(
                "{} style layers but {} style layer weights",
                self.loss.style_layers.len(),
                self.loss.weights.style_layer_weights.len()
            );
        }
        Ok(())
    }
}

/// `~` and `~/...` expand to `$HOME`; `~user` forms are left alone.
fn expand_path(raw: &str) -> PathBuf {
    let raw = match (raw.strip_prefix('~'), std::env::var("HOME")) {
        (Some(rest), Ok(home)) if rest.is_empty() || rest.starts_with('/') => {
            format!("{home}{rest}")
        }
        _ => raw.to_string(),
    };
    PathBuf::from(expand_env(&raw))
}

/// Replace `${VAR}` with its value; unknown variables are left untouched.
fn expand_env(input: &str) -> String {
    let mut out = String::new();
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match std::env::var(key) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => out.push_str(&format!("${{{key}}}")),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        TrainConfig::default().validate().unwrap();
    }

    #[test]
    fn expand_env_keeps_unknown_vars() {
        assert_eq!(
            expand_env("a/${STYLE_TRANSFER_SURELY_UNSET_VAR}/b"),
            "a/${STYLE_TRANSFER_SURELY_UNSET_VAR}/b"
        );
        assert_eq!(expand_env("plain/${unterminated"), "plain/${unterminated");
    }

    #[test]
    fn expand_env_substitutes_known_vars() {
        let path = std::env::var("PATH").unwrap_or_default();
        assert_eq!(expand_env("${PATH}/x"), format!("{path}/x"));
        assert_eq!(expand_env("a${PATH}b${PATH}"), format!("a{path}b{path}"));
    }

    #[test]
    fn tilde_expands_only_for_the_current_user() {
        let Ok(home) = std::env::var("HOME") else {
            return;
        };
        assert_eq!(expand_path("~"), PathBuf::from(&home));
        assert_eq!(expand_path("~/coco/train2014"), PathBuf::from(format!("{home}/coco/train2014")));
        assert_eq!(expand_path("~alice/coco"), PathBuf::from("~alice/coco"));
        assert_eq!(expand_path("data/~/x"), PathBuf::from("data/~/x"));
    }

    #[test]
    fn mismatched_layer_weights_are_rejected() {
        let mut cfg = TrainConfig::default();
        cfg.loss.weights.style_layer_weights.pop();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn odd_image_sizes_are_rejected() {
        let cfg = TrainConfig {
            image_size: (250, 256),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
