use std::path::Path;

use anyhow::{Context, Result};
use faceattr_utils::{config::DetectionSettings, timing_guard};
use image::DynamicImage;
use log::debug;

use crate::model::OnnxModel;
use crate::postprocess::{MAX_STRIDE, PostprocessConfig, fuse_outputs, rows_to_detections};
use crate::preprocess::{PreprocessConfig, preprocess_dynamic_image};
use crate::types::Detection;

/// Finds faces in a whole image.
///
/// An empty vector is a valid answer; the pipeline skips such images.
pub trait FaceDetector {
    /// Detect faces in `image`. `source` is the file it was decoded from and
    /// only serves diagnostics.
    fn detect(&self, image: &DynamicImage, source: &Path) -> Result<Vec<Detection>>;
}

/// YuNet face detector running on `tract`.
#[derive(Debug)]
pub struct YuNetDetector {
    model: OnnxModel,
    preprocess: PreprocessConfig,
    postprocess: PostprocessConfig,
}

impl YuNetDetector {
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        preprocess: PreprocessConfig,
        postprocess: PostprocessConfig,
    ) -> Result<Self> {
        let size = preprocess.input_size;
        anyhow::ensure!(
            size.width % MAX_STRIDE == 0 && size.height % MAX_STRIDE == 0,
            "detector input {}x{} must be a multiple of {MAX_STRIDE} on both sides",
            size.width,
            size.height
        );
        let model = OnnxModel::load(model_path, "detector", size.width, size.height)?;
        Ok(Self {
            model,
            preprocess,
            postprocess,
        })
    }

    /// Build from the `detection` settings section.
    pub fn from_settings<P: AsRef<Path>>(model_path: P, settings: &DetectionSettings) -> Result<Self> {
        Self::new(
            model_path,
            PreprocessConfig::from(settings.input),
            PostprocessConfig::from(settings),
        )
    }
}

impl FaceDetector for YuNetDetector {
    fn detect(&self, image: &DynamicImage, source: &Path) -> Result<Vec<Detection>> {
        let _guard = timing_guard("faceattr_core::detect", log::Level::Debug);
        let prep = preprocess_dynamic_image(image, &self.preprocess)
            .with_context(|| format!("failed to prepare {} for detection", source.display()))?;

        let raw = {
            let _guard = timing_guard("faceattr_core::detector_inference", log::Level::Debug);
            self.model.run(prep.tensor)?
        };

        let rows = fuse_outputs(&raw, self.preprocess.input_size)?;
        let detections = rows_to_detections(&rows, prep.scale_x, prep.scale_y, &self.postprocess);
        debug!(
            "{}: {} face(s) from {} candidate(s)",
            source.display(),
            detections.len(),
            rows.len()
        );
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faceattr_utils::config::InputDimensions;

    #[test]
    fn missing_detector_model_reports_path() {
        let err = YuNetDetector::from_settings("does/not/exist.onnx", &DetectionSettings::default())
            .expect_err("missing model");
        let message = err.to_string();
        assert!(message.contains("detector model file not found"));
        assert!(message.contains("exist.onnx"));
    }

    #[test]
    fn input_off_the_stride_grid_is_rejected() {
        let settings = DetectionSettings {
            input: InputDimensions {
                width: 300,
                height: 640,
                ..InputDimensions::default()
            },
            ..DetectionSettings::default()
        };
        let err = YuNetDetector::from_settings("does/not/exist.onnx", &settings)
            .expect_err("unaligned input");
        assert!(err.to_string().contains("300x640 must be a multiple of 32"));
    }
}
