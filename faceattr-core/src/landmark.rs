use std::path::Path;

use anyhow::{Context, Result};
use faceattr_utils::{
    Point,
    config::{LandmarkSettings, Normalization, ResizeQuality},
    crop_padded, timing_guard,
};
use image::RgbImage;

use crate::model::{OnnxModel, tensor_values};
use crate::preprocess::{InputSize, face_tensor};
use crate::types::{LandmarkCount, Landmarks, RemappedBox};

/// Locates facial keypoints inside a remapped face region.
pub trait LandmarkPredictor {
    /// Predict exactly [`Self::count`] points in image coordinates.
    fn predict(&self, image: &RgbImage, region: &RemappedBox) -> Result<Landmarks>;

    /// Number of points every prediction carries.
    ///
    /// The pipeline rejects a prediction of any other length as a landmark failure.
    fn count(&self) -> LandmarkCount;
}

/// Landmark regressor emitting `2 * N` normalized coordinates.
///
/// Outputs are `(x, y)` pairs in `[0, 1]` relative to the region that was
/// fed to the model.
#[derive(Debug)]
pub struct OnnxLandmarkPredictor {
    model: OnnxModel,
    count: LandmarkCount,
    quality: ResizeQuality,
    normalization: Normalization,
}

impl OnnxLandmarkPredictor {
    pub fn new<P: AsRef<Path>>(model_path: P, settings: &LandmarkSettings) -> Result<Self> {
        let count = LandmarkCount::try_from(settings.points)?;
        let model = OnnxModel::load(
            model_path,
            "landmark",
            settings.input.width,
            settings.input.height,
        )?;
        Ok(Self {
            model,
            count,
            quality: settings.input.resize_quality,
            normalization: settings.normalization,
        })
    }
}

impl LandmarkPredictor for OnnxLandmarkPredictor {
    fn predict(&self, image: &RgbImage, region: &RemappedBox) -> Result<Landmarks> {
        let _guard = timing_guard("faceattr_core::landmark_inference", log::Level::Trace);
        anyhow::ensure!(
            region.width() > 0 && region.height() > 0,
            "landmark region {region:?} is empty"
        );
        let crop = crop_padded(
            image,
            region.x_min,
            region.y_min,
            region.width() as u32,
            region.height() as u32,
        );
        let (w, h) = self.model.input_size();
        let input = face_tensor(&crop, InputSize::new(w, h), self.quality, &self.normalization)?;
        let outputs = self.model.run(input)?;
        let values = outputs
            .first()
            .context("landmark model produced no outputs")
            .and_then(|t| tensor_values(t, "landmark"))?;
        decode_points(values, region, self.count)
    }

    fn count(&self) -> LandmarkCount {
        self.count
    }
}

/// Map normalized `(x, y)` pairs back into image space.
pub fn decode_points(values: &[f32], region: &RemappedBox, count: LandmarkCount) -> Result<Landmarks> {
    anyhow::ensure!(
        values.len() == count.get() * 2,
        "landmark model returned {} values, expected {} for {} points",
        values.len(),
        count.get() * 2,
        count
    );
    let origin = Point::new(region.x_min as f32, region.y_min as f32);
    let (w, h) = (region.width() as f32, region.height() as f32);
    let points = values
        .chunks_exact(2)
        .map(|pair| origin + Point::new(pair[0] * w, pair[1] * h))
        .collect();
    Landmarks::new(points, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGION: RemappedBox = RemappedBox {
        x_min: 10,
        y_min: 20,
        x_max: 110,
        y_max: 70,
    };

    #[test]
    fn points_are_mapped_into_the_region() {
        let values = [0.0, 0.0, 1.0, 1.0, 0.5, 0.5];
        let landmarks = decode_points(&values, &REGION, LandmarkCount::Three).expect("decode");
        assert_eq!(
            landmarks.points(),
            &[
                Point::new(10.0, 20.0),
                Point::new(110.0, 70.0),
                Point::new(60.0, 45.0),
            ]
        );
    }

    #[test]
    fn wrong_output_length_is_rejected() {
        let err = decode_points(&[0.5; 6], &REGION, LandmarkCount::Five).expect_err("short");
        assert!(err.to_string().contains("expected 10"));
    }

    #[test]
    fn unsupported_point_count_fails_at_construction() {
        let settings = LandmarkSettings {
            points: 68,
            ..Default::default()
        };
        let err = OnnxLandmarkPredictor::new("unused.onnx", &settings).expect_err("68 points");
        assert!(err.to_string().contains("unsupported landmark count"));
    }
}
