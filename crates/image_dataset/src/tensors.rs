//! Conversions between `image` buffers and Burn tensors.

use crate::images::rgb_to_chw;
use crate::types::{DatasetError, DatasetResult};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use image::RgbImage;

/// `[1, 3, H, W]` tensor in [0, 1].
pub fn image_to_tensor<B: Backend>(img: &RgbImage, device: &B::Device) -> Tensor<B, 4> {
    let (width, height) = img.dimensions();
    Tensor::<B, 4>::from_data(
        TensorData::new(rgb_to_chw(img), [1, 3, height as usize, width as usize]),
        device,
    )
}

/// Split a `[N, 3, H, W]` tensor on the 0..255 scale into RGB8 images, clamping out-of-range
/// values.
pub fn tensor_to_images<B: Backend>(x: Tensor<B, 4>) -> DatasetResult<Vec<RgbImage>> {
    let [batch, channels, height, width] = x.dims();
    if channels != 3 {
        return Err(DatasetError::Other(format!(
            "expected 3-channel images, got {channels}"
        )));
    }
    let values = x
        .clamp(0.0, 255.0)
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| DatasetError::Other(format!("failed to read tensor data: {e:?}")))?;
    let plane = height * width;
    let mut images = Vec::with_capacity(batch);
    for b in 0..batch {
        let base = b * 3 * plane;
        let mut raw = Vec::with_capacity(plane * 3);
        for i in 0..plane {
            for c in 0..3 {
                raw.push(values[base + c * plane + i].round() as u8);
            }
        }
        let img = RgbImage::from_raw(width as u32, height as u32, raw)
            .ok_or_else(|| DatasetError::Other("image buffer size mismatch".to_string()))?;
        images.push(img);
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    type TestBackend = burn_ndarray::NdArray<f32>;

    #[test]
    fn tensor_output_is_clamped_and_rounded() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::from_floats(
            [[[[-10.0, 127.6]], [[300.0, 0.4]], [[255.0, 64.5]]]],
            &device,
        );
        let images = tensor_to_images(x).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].dimensions(), (2, 1));
        assert_eq!(*images[0].get_pixel(0, 0), Rgb([0, 255, 255]));
        assert_eq!(*images[0].get_pixel(1, 0), Rgb([128, 0, 65]));
    }

    #[test]
    fn image_tensor_has_batch_of_one() {
        let device = Default::default();
        let img = RgbImage::from_pixel(5, 3, Rgb([255, 255, 255]));
        let t = image_to_tensor::<TestBackend>(&img, &device);
        assert_eq!(t.dims(), [1, 3, 3, 5]);
    }
}
