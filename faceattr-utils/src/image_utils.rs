use std::{fmt, path::Path, str::FromStr};

use anyhow::{Context, Result};
use image::{DynamicImage, Rgb, RgbImage, imageops::FilterType};
use ndarray::Array3;
use serde::{Deserialize, Serialize};

/// Channel order a model expects its input pixels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelOrder::Rgb => "rgb",
            ChannelOrder::Bgr => "bgr",
        })
    }
}

impl FromStr for ChannelOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rgb" => Ok(ChannelOrder::Rgb),
            "bgr" => Ok(ChannelOrder::Bgr),
            other => Err(format!(
                "invalid channel order '{other}'; expected 'rgb' or 'bgr'"
            )),
        }
    }
}

/// Load an image from disk into memory.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path_ref = path.as_ref();
    image::open(path_ref).with_context(|| format!("failed to open image {}", path_ref.display()))
}

/// Resize an image to exactly `width` x `height`.
pub fn resize_image(image: &DynamicImage, width: u32, height: u32, filter: FilterType) -> RgbImage {
    image.resize_exact(width, height, filter).to_rgb8()
}

/// Re-order an RGB buffer into `order`.
///
/// Decoded frames are always RGB; a `Bgr` target swaps the red and blue
/// planes, `Rgb` returns an unchanged copy.
pub fn convert_channel_order(image: &RgbImage, order: ChannelOrder) -> RgbImage {
    match order {
        ChannelOrder::Rgb => image.clone(),
        ChannelOrder::Bgr => {
            let mut swapped = image.clone();
            for pixel in swapped.pixels_mut() {
                pixel.0.swap(0, 2);
            }
            swapped
        }
    }
}

/// Copy the `width` x `height` region at (`x`, `y`) out of `image`.
///
/// The region may extend past any edge; uncovered pixels are black.
pub fn crop_padded(image: &RgbImage, x: i32, y: i32, width: u32, height: u32) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(width.max(1), height.max(1), Rgb([0, 0, 0]));
    let (img_w, img_h) = (image.width() as i64, image.height() as i64);

    let src_x0 = (x as i64).clamp(0, img_w);
    let src_y0 = (y as i64).clamp(0, img_h);
    let src_x1 = (x as i64 + width as i64).clamp(0, img_w);
    let src_y1 = (y as i64 + height as i64).clamp(0, img_h);

    for sy in src_y0..src_y1 {
        for sx in src_x0..src_x1 {
            let dx = (sx - x as i64) as u32;
            let dy = (sy - y as i64) as u32;
            canvas.put_pixel(dx, dy, *image.get_pixel(sx as u32, sy as u32));
        }
    }
    canvas
}

/// Convert an RGB image into a BGR CHW array with raw 0..255 values, the
/// layout OpenCV's `blobFromImage` produces.
pub fn rgb_to_bgr_chw(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut array = Array3::<f32>::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        array[(0, yi, xi)] = pixel[2] as f32;
        array[(1, yi, xi)] = pixel[1] as f32;
        array[(2, yi, xi)] = pixel[0] as f32;
    }
    array
}

/// Convert an image into a CHW array, keeping its channel order and applying
/// `(value - mean[c]) / std[c]` per channel.
pub fn rgb_to_chw_normalized(image: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let inv_std = std.map(|s| if s.abs() > f32::EPSILON { 1.0 / s } else { 1.0 });
    let mut array = Array3::<f32>::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        for c in 0..3 {
            array[(c, yi, xi)] = (pixel[c] as f32 - mean[c]) * inv_std[c];
        }
    }
    array
}

/// Compute scale factors that map model-space coordinates back to the source image.
pub fn compute_resize_scales(original: (u32, u32), target: (u32, u32)) -> Result<(f32, f32)> {
    let (orig_w, orig_h) = original;
    let (target_w, target_h) = target;
    anyhow::ensure!(
        target_w > 0 && target_h > 0,
        "target dimensions must be non-zero"
    );
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "original dimensions must be non-zero"
    );
    Ok((
        orig_w as f32 / target_w as f32,
        orig_h as f32 / target_h as f32,
    ))
}
