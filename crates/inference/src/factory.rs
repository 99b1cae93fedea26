use crate::InferenceBackend;
use burn::tensor::backend::Backend;
use image::RgbImage;
use image_dataset::{crop_to_multiple, image_to_tensor, tensor_to_images};
use models::{check_input_size, StyleTransferNet, StyleTransferNetConfig, INPUT_MULTIPLE};
use std::path::Path;
use training::CheckpointManager;

/// A style network ready to run on single images.
pub struct Stylizer {
    model: StyleTransferNet<InferenceBackend>,
    config: StyleTransferNetConfig,
    device: <InferenceBackend as Backend>::Device,
    trained: bool,
}

impl Stylizer {
    pub fn config(&self) -> &StyleTransferNetConfig {
        &self.config
    }

    /// False when built from random weights.
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Stylize one image. The bottom/right edges are cropped to a multiple of 4 first, so the
    /// output can be slightly smaller than the input.
    pub fn stylize(&self, img: &RgbImage) -> anyhow::Result<RgbImage> {
        let cropped = crop_to_multiple(img, INPUT_MULTIPLE as u32)?;
        let (w, h) = cropped.dimensions();
        check_input_size(h as usize, w as usize)
            .map_err(|e| anyhow::anyhow!("cannot stylize image: {e}"))?;
        let input = image_to_tensor::<InferenceBackend>(&cropped, &self.device);
        let output = self.model.forward(input);
        tensor_to_images(output)?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("network returned an empty batch"))
    }
}

/// Builds [`Stylizer`]s from checkpoint directories written by `train`.
pub struct StylizerFactory;

impl StylizerFactory {
    pub fn load(&self, checkpoint_dir: &Path) -> anyhow::Result<Stylizer> {
        let device = <InferenceBackend as Backend>::Device::default();
        let (model, config) =
            CheckpointManager::open(checkpoint_dir).load_model::<InferenceBackend>(&device)?;
        tracing::info!("loaded style network from {}", checkpoint_dir.display());
        Ok(Stylizer {
            model,
            config,
            device,
            trained: true,
        })
    }

    /// Load from `checkpoint_dir` when possible, otherwise an untrained network.
    pub fn build(&self, checkpoint_dir: Option<&Path>) -> Stylizer {
        if let Some(dir) = checkpoint_dir {
            match self.load(dir) {
                Ok(stylizer) => return stylizer,
                Err(err) => tracing::warn!(
                    "failed to load checkpoint from {}: {err:#}. Falling back to an untrained network.",
                    dir.display()
                ),
            }
        } else {
            tracing::warn!("no checkpoint dir provided; using an untrained network");
        }
        let device = <InferenceBackend as Backend>::Device::default();
        let config = StyleTransferNetConfig::default();
        Stylizer {
            model: StyleTransferNet::new(config.clone(), &device),
            config,
            device,
            trained: false,
        }
    }
}
