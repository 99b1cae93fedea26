//! Image loading and batching for style transfer training.
//!
//! - Indexing a flat folder of photos (e.g. COCO `train2014/`)
//! - Loading, resizing and thumbnailing single images
//! - Converting between `image` buffers and Burn tensors
//! - Burn batch iteration with parallel decode, shuffling and repeat

pub mod folder;
pub mod images;
pub mod types;

#[cfg(feature = "burn-runtime")]
pub mod batch;
#[cfg(feature = "burn-runtime")]
pub mod tensors;

pub use folder::{index_images, is_image_path};
pub use images::{crop_to_multiple, image_grid, load_image, rgb_to_chw, thumbnail_dims};
pub use types::*;

#[cfg(feature = "burn-runtime")]
pub use batch::{BatchIter, DatasetConfig, ImageBatch};
#[cfg(feature = "burn-runtime")]
pub use tensors::{image_to_tensor, tensor_to_images};
