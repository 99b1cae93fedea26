//! Batch iteration for training.

use crate::images::{load_image, rgb_to_chw};
use crate::types::{DatasetError, DatasetResult, ImageSample, ResizeMode};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub(crate) const DEFAULT_LOG_EVERY_BATCHES: usize = 500;

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Every image is force-resized to this (width, height).
    pub target_size: (u32, u32),
    /// Shuffle at the start of every pass.
    pub shuffle: bool,
    /// Seed for reproducible shuffling.
    pub seed: Option<u64>,
    /// Discard the trailing partial batch of each pass.
    pub drop_last: bool,
    /// Start a new pass when the images run out instead of ending iteration.
    pub repeat: bool,
    /// Skip undecodable images with a warning instead of failing the batch.
    pub permissive: bool,
    /// Log throughput every N batches; `None` disables progress logs.
    pub log_every_batches: Option<usize>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            target_size: (256, 256),
            shuffle: true,
            seed: None,
            drop_last: true,
            repeat: true,
            permissive: true,
            log_every_batches: Some(DEFAULT_LOG_EVERY_BATCHES),
        }
    }
}

pub struct ImageBatch<B: burn::tensor::backend::Backend> {
    /// `[N, 3, H, W]` in [0, 1].
    pub images: burn::tensor::Tensor<B, 4>,
    pub paths: Vec<PathBuf>,
}

pub struct BatchIter {
    paths: Vec<PathBuf>,
    order: Vec<usize>,
    cursor: usize,
    cfg: DatasetConfig,
    rng: StdRng,
    passes: usize,
    loaded_this_pass: usize,
    processed_samples: usize,
    processed_batches: usize,
    skipped_errors: usize,
    started: Instant,
    total_load_time: Duration,
    last_log: Instant,
    images_buf: Vec<f32>,
}

impl BatchIter {
    pub fn new(paths: Vec<PathBuf>, cfg: DatasetConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let now = Instant::now();
        let mut iter = Self {
            order: (0..paths.len()).collect(),
            paths,
            cursor: 0,
            cfg,
            rng,
            passes: 0,
            loaded_this_pass: 0,
            processed_samples: 0,
            processed_batches: 0,
            skipped_errors: 0,
            started: now,
            total_load_time: Duration::ZERO,
            last_log: now,
            images_buf: Vec::new(),
        };
        if iter.cfg.shuffle {
            iter.order.shuffle(&mut iter.rng);
        }
        iter
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Completed passes over the image list.
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn skipped_errors(&self) -> usize {
        self.skipped_errors
    }

    fn start_pass(&mut self) {
        self.passes += 1;
        self.cursor = 0;
        self.loaded_this_pass = 0;
        if self.cfg.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }

    pub fn next_batch<B: burn::tensor::backend::Backend>(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> DatasetResult<Option<ImageBatch<B>>> {
        let batch_size = batch_size.max(1);
        let size = self.cfg.target_size;
        let mut pending: Vec<ImageSample> = Vec::with_capacity(batch_size);

        while pending.len() < batch_size {
            if self.cursor >= self.order.len() {
                if !self.cfg.repeat {
                    break;
                }
                let starved = self.loaded_this_pass == 0
                    || (self.cfg.drop_last && self.loaded_this_pass < batch_size);
                if starved {
                    return Err(DatasetError::Other(format!(
                        "a full pass decoded {} of {} images; cannot fill a batch of {batch_size}",
                        self.loaded_this_pass,
                        self.order.len()
                    )));
                }
                if self.cfg.drop_last {
                    pending.clear();
                }
                self.start_pass();
                continue;
            }

            let want = batch_size - pending.len();
            let end = (self.cursor + want).min(self.order.len());
            let chunk: Vec<PathBuf> = self.order[self.cursor..end]
                .iter()
                .map(|&i| self.paths[i].clone())
                .collect();
            self.cursor = end;

            let t_load = Instant::now();
            let loaded: Vec<(PathBuf, DatasetResult<ImageSample>)> = chunk
                .into_par_iter()
                .map(|path| {
                    let res = load_sample(&path, size);
                    (path, res)
                })
                .collect();
            self.total_load_time += t_load.elapsed();

            for (path, res) in loaded {
                match res {
                    Ok(sample) => {
                        self.loaded_this_pass += 1;
                        pending.push(sample);
                    }
                    Err(e) if self.cfg.permissive => {
                        tracing::warn!("skipping image {}: {e}", path.display());
                        self.skipped_errors += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        if pending.is_empty() || (self.cfg.drop_last && pending.len() < batch_size) {
            return Ok(None);
        }

        let (width, height) = size;
        let batch_len = pending.len();
        self.images_buf.clear();
        self.images_buf
            .reserve(batch_len * 3 * width as usize * height as usize);
        let mut paths = Vec::with_capacity(batch_len);
        for sample in pending {
            self.images_buf.extend_from_slice(&sample.image_chw);
            paths.push(sample.path);
        }
        let images =
            burn::tensor::Tensor::<B, 1>::from_floats(self.images_buf.as_slice(), device)
                .reshape([batch_len, 3, height as usize, width as usize]);

        self.processed_samples += batch_len;
        self.processed_batches += 1;
        self.maybe_log_progress();

        Ok(Some(ImageBatch { images, paths }))
    }

    fn maybe_log_progress(&mut self) {
        let Some(every) = self.cfg.log_every_batches else {
            return;
        };
        let due = self.processed_batches % every.max(1) == 0
            || self.last_log.elapsed() >= Duration::from_secs(30);
        if !due {
            return;
        }
        let secs = self.started.elapsed().as_secs_f32().max(0.001);
        let avg_load_ms =
            (self.total_load_time.as_secs_f64() * 1000.0) / self.processed_batches.max(1) as f64;
        tracing::debug!(
            batches = self.processed_batches,
            samples = self.processed_samples,
            passes = self.passes,
            skipped = self.skipped_errors,
            "[dataset] {:.1} img/s, avg_load_ms={:.2}",
            self.processed_samples as f32 / secs,
            avg_load_ms
        );
        self.last_log = Instant::now();
    }
}

fn load_sample(path: &Path, size: (u32, u32)) -> DatasetResult<ImageSample> {
    let img = load_image(path, Some(size), ResizeMode::Force)?;
    let (width, height) = img.dimensions();
    Ok(ImageSample {
        path: path.to_path_buf(),
        image_chw: rgb_to_chw(&img),
        width,
        height,
    })
}
