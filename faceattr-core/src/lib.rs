//! Face detection, landmark, alignment and attribute inference.
//!
//! Models run on the CPU through `tract-onnx`. Each stage sits behind a
//! trait so the [`Pipeline`] can be driven by any implementation.

/// Landmark-driven similarity alignment.
pub mod align;
/// Gender, age and expression classification.
pub mod attribute;
/// Face detection on whole images.
pub mod detector;
/// Landmark regression inside a face region.
pub mod landmark;
/// ONNX model loading and execution.
pub mod model;
/// Per-image driver.
pub mod pipeline;
/// YuNet output decoding and NMS.
pub mod postprocess;
/// Image to tensor conversion.
pub mod preprocess;
/// Detector box to landmark region mapping.
pub mod remap;
/// Overlay drawing.
pub mod render;
/// Values passed between stages.
pub mod types;

pub use align::{AlignTemplate, FaceAligner, SimilarityAligner, SimilarityTransform};
pub use attribute::{AttributeLabels, AttributePredictor, OnnxAttributePredictor, decode_heads};
pub use detector::{FaceDetector, YuNetDetector};
pub use landmark::{LandmarkPredictor, OnnxLandmarkPredictor};
pub use model::OnnxModel;
pub use pipeline::{
    AnnotatedImage, FaceReport, FrameViewer, ImageOutcome, ModelContext, NoopViewer, Pipeline,
    PipelineError, PipelineOptions, Stage,
};
pub use postprocess::{FACE_CLASS, PostprocessConfig};
pub use preprocess::{InputSize, PreprocessConfig, PreprocessOutput, preprocess_dynamic_image};
pub use remap::remap_box;
pub use render::{FaceOverlay, Renderer};
pub use types::{AlignedFace, AttributeResult, Detection, LandmarkCount, Landmarks, RemappedBox};
