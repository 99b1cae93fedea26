#![recursion_limit = "256"]

pub mod factory;

#[cfg(feature = "backend-wgpu")]
pub type InferenceBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

pub use factory::{Stylizer, StylizerFactory};

pub mod prelude {
    pub use crate::factory::{Stylizer, StylizerFactory};
    pub use crate::InferenceBackend;
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn factory_falls_back_without_checkpoint() {
        let stylizer = StylizerFactory.build(None);
        assert!(!stylizer.is_trained());
        let out = stylizer
            .stylize(&RgbImage::from_pixel(16, 12, Rgb([10, 20, 30])))
            .unwrap();
        assert_eq!(out.dimensions(), (16, 12));
    }
}
