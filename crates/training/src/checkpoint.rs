//! Checkpoint directory layout:
//!
//! ```text
//! <dir>/model_checkpoint.bin   network weights (BinFileRecorder, full precision)
//! <dir>/model_config.json      StyleTransferNetConfig needed to rebuild the network
//! <dir>/training_state.json    completed epochs, step count, per-epoch losses
//! ```

use anyhow::Context;
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use models::{StyleTransferNet, StyleTransferNetConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const WEIGHTS_FILE: &str = "model_checkpoint.bin";
pub const MODEL_CONFIG_FILE: &str = "model_config.json";
pub const STATE_FILE: &str = "training_state.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Last fully completed epoch (1-based); 0 before the first epoch finishes.
    pub epoch: usize,
    pub global_step: u64,
    pub epoch_losses: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create checkpoint dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing checkpoint directory without creating it.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(WEIGHTS_FILE)
    }

    pub fn has_checkpoint(&self) -> bool {
        self.weights_path().is_file()
    }

    pub fn save<B: Backend>(
        &self,
        model: &StyleTransferNet<B>,
        model_cfg: &StyleTransferNetConfig,
        state: &TrainingState,
    ) -> anyhow::Result<()> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let weights = self.weights_path();
        model
            .clone()
            .save_file(weights.clone(), &recorder)
            .map_err(|e| anyhow::anyhow!("failed to save checkpoint {}: {e}", weights.display()))?;

        let cfg_path = self.dir.join(MODEL_CONFIG_FILE);
        fs::write(&cfg_path, serde_json::to_vec_pretty(model_cfg)?)
            .with_context(|| format!("failed to write {}", cfg_path.display()))?;
        let state_path = self.dir.join(STATE_FILE);
        fs::write(&state_path, serde_json::to_vec_pretty(state)?)
            .with_context(|| format!("failed to write {}", state_path.display()))?;
        tracing::debug!(epoch = state.epoch, step = state.global_step, "saved checkpoint to {}", weights.display());
        Ok(())
    }

    /// Network config recorded next to the weights; defaults when the sidecar is missing.
    pub fn load_model_config(&self) -> anyhow::Result<StyleTransferNetConfig> {
        let path = self.dir.join(MODEL_CONFIG_FILE);
        if !path.exists() {
            tracing::warn!(
                "{} missing; assuming the default network config",
                path.display()
            );
            return Ok(StyleTransferNetConfig::default());
        }
        let raw = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_slice(&raw).with_context(|| format!("invalid {}", path.display()))
    }

    pub fn load_model<B: Backend>(
        &self,
        device: &B::Device,
    ) -> anyhow::Result<(StyleTransferNet<B>, StyleTransferNetConfig)> {
        let cfg = self.load_model_config()?;
        let weights = self.weights_path();
        if !weights.is_file() {
            anyhow::bail!("no checkpoint at {}", weights.display());
        }
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let model = StyleTransferNet::<B>::new(cfg.clone(), device)
            .load_file(weights.clone(), &recorder, device)
            .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", weights.display()))?;
        Ok((model, cfg))
    }

    pub fn load_state(&self) -> anyhow::Result<TrainingState> {
        let path = self.dir.join(STATE_FILE);
        if !path.exists() {
            return Ok(TrainingState::default());
        }
        let raw = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_slice(&raw).with_context(|| format!("invalid {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn_ndarray::NdArray<f32>;

    #[test]
    fn save_then_load_round_trips_config_and_state() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(tmp.path().join("ckpt")).unwrap();
        assert!(!mgr.has_checkpoint());
        assert_eq!(mgr.load_state().unwrap(), TrainingState::default());

        let device = Default::default();
        let cfg = StyleTransferNetConfig {
            base_channels: 2,
            residual_blocks: 1,
            ..Default::default()
        };
        let model = StyleTransferNet::<TestBackend>::new(cfg.clone(), &device);
        let state = TrainingState {
            epoch: 1,
            global_step: 7,
            epoch_losses: vec![3.5],
        };
        mgr.save(&model, &cfg, &state).unwrap();

        assert!(mgr.has_checkpoint());
        assert_eq!(mgr.load_state().unwrap(), state);
        let (_loaded, loaded_cfg) = mgr.load_model::<TestBackend>(&device).unwrap();
        assert_eq!(loaded_cfg, cfg);
    }

    #[test]
    fn loading_without_weights_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::open(tmp.path());
        assert!(mgr.load_model::<TestBackend>(&Default::default()).is_err());
    }
}
