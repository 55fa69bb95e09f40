//! Serializable report records for `--json`.

use faceattr_core::{FaceReport, ImageOutcome};
use serde::Serialize;

/// One face of an annotated image.
#[derive(Debug, Serialize)]
pub struct FaceRecord {
    pub index: usize,
    pub class_name: String,
    pub score: f32,
    /// Detector box as `[xmin, ymin, xmax, ymax]`.
    pub bbox: [f32; 4],
    /// Landmark region as `[x_min, y_min, x_max, y_max]`.
    pub region: [i32; 4],
    pub landmarks: Vec<[f32; 2]>,
    pub gender: String,
    pub age: String,
    pub expression: [String; 2],
    pub aligned: String,
}

/// Outcome for one input image.
#[derive(Debug, Serialize)]
pub struct ImageRecord {
    pub image: String,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated: Option<String>,
    pub faces: Vec<FaceRecord>,
}

impl From<&FaceReport> for FaceRecord {
    fn from(face: &FaceReport) -> Self {
        let d = &face.detection;
        let r = &face.region;
        Self {
            index: face.index,
            class_name: d.class_name.clone(),
            score: d.score,
            bbox: [d.xmin, d.ymin, d.xmax, d.ymax],
            region: [r.x_min, r.y_min, r.x_max, r.y_max],
            landmarks: face.landmarks.iter().map(|p| [p.x, p.y]).collect(),
            gender: face.attributes.gender.clone(),
            age: face.attributes.age.clone(),
            expression: [
                face.attributes.expression.0.clone(),
                face.attributes.expression.1.clone(),
            ],
            aligned: face.aligned_path.display().to_string(),
        }
    }
}

impl From<&ImageOutcome> for ImageRecord {
    fn from(outcome: &ImageOutcome) -> Self {
        match outcome {
            ImageOutcome::Skipped { source } => Self {
                image: source.display().to_string(),
                skipped: true,
                annotated: None,
                faces: Vec::new(),
            },
            ImageOutcome::Annotated(annotated) => Self {
                image: annotated.source.display().to_string(),
                skipped: false,
                annotated: Some(annotated.annotated_path.display().to_string()),
                faces: annotated.faces.iter().map(FaceRecord::from).collect(),
            },
        }
    }
}
