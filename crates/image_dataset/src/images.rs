//! Single-image helpers: decode, resize, layout conversion and grid composition.

use crate::types::{DatasetError, DatasetResult, ResizeMode};
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use std::path::Path;

/// Decode `path` to RGB8, optionally resizing to `dim` (width, height).
pub fn load_image(
    path: &Path,
    dim: Option<(u32, u32)>,
    mode: ResizeMode,
) -> DatasetResult<RgbImage> {
    let img = image::open(path)
        .map_err(|e| DatasetError::Image {
            path: path.to_path_buf(),
            source: e,
        })?
        .to_rgb8();
    let Some((w, h)) = dim else {
        return Ok(img);
    };
    let (tw, th) = match mode {
        ResizeMode::Force => (w, h),
        ResizeMode::Thumbnail => thumbnail_dims(img.dimensions(), (w, h)),
    };
    if (tw, th) == img.dimensions() {
        return Ok(img);
    }
    Ok(image::imageops::resize(&img, tw, th, FilterType::Triangle))
}

/// Largest size that fits inside `bound` with the aspect ratio of `size`. Never enlarges.
pub fn thumbnail_dims(size: (u32, u32), bound: (u32, u32)) -> (u32, u32) {
    let (w, h) = size;
    let (max_w, max_h) = bound;
    if w <= max_w && h <= max_h {
        return (w, h);
    }
    let scale = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    let tw = ((w as f64 * scale).round() as u32).clamp(1, max_w);
    let th = ((h as f64 * scale).round() as u32).clamp(1, max_h);
    (tw, th)
}

/// CHW f32 buffer in [0, 1].
pub fn rgb_to_chw(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut out = vec![0.0f32; plane * 3];
    for (i, px) in img.pixels().enumerate() {
        out[i] = px[0] as f32 / 255.0;
        out[plane + i] = px[1] as f32 / 255.0;
        out[2 * plane + i] = px[2] as f32 / 255.0;
    }
    out
}

/// Crop the bottom/right edge so both dims are multiples of `multiple`.
pub fn crop_to_multiple(img: &RgbImage, multiple: u32) -> DatasetResult<RgbImage> {
    let multiple = multiple.max(1);
    let (w, h) = img.dimensions();
    let cw = w - w % multiple;
    let ch = h - h % multiple;
    if cw == 0 || ch == 0 {
        return Err(DatasetError::Other(format!(
            "image {w}x{h} is smaller than the required multiple {multiple}"
        )));
    }
    if (cw, ch) == (w, h) {
        return Ok(img.clone());
    }
    Ok(image::imageops::crop_imm(img, 0, 0, cw, ch).to_image())
}

/// Tile `images` row-major into `ceil(n / rows)` columns. Cells are sized to the largest image;
/// unused space is black.
pub fn image_grid(images: &[RgbImage], rows: u32) -> Option<RgbImage> {
    if images.is_empty() {
        return None;
    }
    let n = images.len() as u32;
    let rows = rows.clamp(1, n);
    let cols = n.div_ceil(rows);
    let cell_w = images.iter().map(|i| i.width()).max().unwrap_or(1);
    let cell_h = images.iter().map(|i| i.height()).max().unwrap_or(1);
    let mut canvas = RgbImage::from_pixel(cell_w * cols, cell_h * rows, Rgb([0, 0, 0]));
    for (idx, img) in images.iter().enumerate() {
        let idx = idx as u32;
        let x = (idx % cols) * cell_w;
        let y = (idx / cols) * cell_h;
        image::imageops::replace(&mut canvas, img, x as i64, y as i64);
    }
    Some(canvas)
}
