//! Error definitions and shared data types for image_dataset.

use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no images found under {}", path.display())]
    Empty { path: PathBuf },
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// Stretch to exactly the target dimensions.
    Force,
    /// Shrink to fit inside the target dimensions, keeping aspect ratio. Never enlarges.
    Thumbnail,
}

/// One decoded image.
#[derive(Debug, Clone)]
pub struct ImageSample {
    pub path: PathBuf,
    /// CHW layout, normalized to [0, 1].
    pub image_chw: Vec<f32>,
    pub width: u32,
    pub height: u32,
}
