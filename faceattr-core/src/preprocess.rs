//! Conversion of images into model input tensors.
//!
//! The detector takes raw 0..255 BGR planes at a fixed resolution and needs
//! the scale factors to map boxes back. The landmark and attribute models
//! take normalized planes of a face crop in whatever channel order the crop
//! already has.

use std::borrow::Cow;

use anyhow::Result;
use faceattr_utils::{
    compute_resize_scales,
    config::{InputDimensions, Normalization, ResizeQuality},
    resize_image, rgb_to_bgr_chw, rgb_to_chw_normalized, timing_guard,
};
use image::{DynamicImage, GenericImageView, RgbImage, imageops::FilterType};
use tract_onnx::prelude::Tensor;

/// Input resolution of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl InputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self::new(640, 640)
    }
}

/// Detector preprocessing parameters.
#[derive(Debug, Clone, Default)]
pub struct PreprocessConfig {
    pub input_size: InputSize,
    pub resize_quality: ResizeQuality,
}

impl PreprocessConfig {
    fn resize_filter(&self) -> FilterType {
        resize_filter(self.resize_quality)
    }
}

pub(crate) fn resize_filter(quality: ResizeQuality) -> FilterType {
    match quality {
        ResizeQuality::Quality => FilterType::Triangle,
        ResizeQuality::Speed => FilterType::Nearest,
    }
}

/// Detector tensor plus what is needed to map its output back.
#[derive(Debug)]
pub struct PreprocessOutput {
    pub tensor: Tensor,
    pub scale_x: f32,
    pub scale_y: f32,
    pub original_size: (u32, u32),
}

impl From<InputDimensions> for PreprocessConfig {
    fn from(dimensions: InputDimensions) -> Self {
        PreprocessConfig {
            input_size: InputSize::new(dimensions.width, dimensions.height),
            resize_quality: dimensions.resize_quality,
        }
    }
}

/// Resize `image` to the detector resolution and lay it out as `[1, 3, H, W]` BGR.
pub fn preprocess_dynamic_image(
    image: &DynamicImage,
    config: &PreprocessConfig,
) -> Result<PreprocessOutput> {
    let _guard = timing_guard("faceattr_core::preprocess_detector", log::Level::Trace);
    let InputSize {
        width: input_w,
        height: input_h,
    } = config.input_size;
    anyhow::ensure!(
        input_w > 0 && input_h > 0,
        "input dimensions must be greater than zero"
    );

    let (orig_w, orig_h) = image.dimensions();
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "source image dimensions must be greater than zero"
    );
    let resized: Cow<'_, RgbImage> = match image.as_rgb8() {
        Some(rgb) if orig_w == input_w && orig_h == input_h => Cow::Borrowed(rgb),
        _ => Cow::Owned(resize_image(image, input_w, input_h, config.resize_filter())),
    };
    let (data, offset) = rgb_to_bgr_chw(&resized).into_raw_vec_and_offset();
    debug_assert_eq!(offset, Some(0), "expected contiguous array");
    let tensor = planes_to_tensor(&data, input_w, input_h)?;

    let (scale_x, scale_y) = compute_resize_scales((orig_w, orig_h), (input_w, input_h))?;

    Ok(PreprocessOutput {
        tensor,
        scale_x,
        scale_y,
        original_size: (orig_w, orig_h),
    })
}

/// Resize a face crop to `size` and build a normalized `[1, 3, H, W]` tensor.
///
/// Channels are taken in the order they appear in `crop`.
pub fn face_tensor(
    crop: &RgbImage,
    size: InputSize,
    quality: ResizeQuality,
    normalization: &Normalization,
) -> Result<Tensor> {
    anyhow::ensure!(
        size.width > 0 && size.height > 0,
        "input dimensions must be greater than zero"
    );
    let resized: Cow<'_, RgbImage> = if crop.dimensions() == (size.width, size.height) {
        Cow::Borrowed(crop)
    } else {
        Cow::Owned(image::imageops::resize(
            crop,
            size.width,
            size.height,
            resize_filter(quality),
        ))
    };
    let (data, offset) =
        rgb_to_chw_normalized(&resized, normalization.mean, normalization.std)
            .into_raw_vec_and_offset();
    debug_assert_eq!(offset, Some(0), "expected contiguous array");
    planes_to_tensor(&data, size.width, size.height)
}

fn planes_to_tensor(data: &[f32], width: u32, height: u32) -> Result<Tensor> {
    let shape = [1usize, 3, height as usize, width as usize];
    Tensor::from_shape(&shape, data).map_err(|e| anyhow::anyhow!("failed to build tensor: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn detector_tensor_has_expected_shape_and_scales() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 160, Rgb([10, 20, 30])));
        let config = PreprocessConfig {
            input_size: InputSize::new(160, 80),
            resize_quality: ResizeQuality::Speed,
        };
        let out = preprocess_dynamic_image(&image, &config).expect("preprocess");
        assert_eq!(out.tensor.shape(), &[1, 3, 80, 160]);
        assert_eq!((out.scale_x, out.scale_y), (2.0, 2.0));
        assert_eq!(out.original_size, (320, 160));
        let values = out.tensor.as_slice::<f32>().unwrap();
        // First plane is blue.
        assert_eq!(values[0], 30.0);
    }

    #[test]
    fn face_tensor_normalizes_without_reordering() {
        let crop = RgbImage::from_pixel(8, 8, Rgb([255, 0, 51]));
        let tensor = face_tensor(
            &crop,
            InputSize::new(4, 4),
            ResizeQuality::Quality,
            &Normalization::UNIT,
        )
        .expect("tensor");
        assert_eq!(tensor.shape(), &[1, 3, 4, 4]);
        let values = tensor.as_slice::<f32>().unwrap();
        assert!((values[0] - 1.0).abs() < 1e-6);
        assert!(values[16].abs() < 1e-6);
        assert!((values[32] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn zero_sized_input_is_rejected() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let config = PreprocessConfig {
            input_size: InputSize::new(0, 4),
            ..Default::default()
        };
        assert!(preprocess_dynamic_image(&image, &config).is_err());
    }
}
