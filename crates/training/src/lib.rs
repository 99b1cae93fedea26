#![recursion_limit = "256"]

pub mod checkpoint;
pub mod config;
pub mod loss;
pub mod metrics;
pub mod util;

pub use checkpoint::{CheckpointManager, TrainingState};
pub use metrics::{MetricKind, MetricsSink};
pub use config::{LossConfig, TrainConfig};
pub use loss::{LossBreakdown, LossNetwork, LossWeights, StyleTargets};
pub use models::{StyleTransferNet, StyleTransferNetConfig, VggLayer};
pub use util::{run_train, train_step, train_with_config, TrainArgs, TrainReport};

/// Backend alias for training (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
