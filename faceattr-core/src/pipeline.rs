//! Per-image driver chaining detection, landmarks, alignment and attributes.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use faceattr_utils::{
    AppSettings, Point, convert_channel_order, load_image, timing_guard,
};
use image::{DynamicImage, RgbImage};
use log::{debug, info};
use thiserror::Error;

use crate::align::{FaceAligner, SimilarityAligner};
use crate::attribute::{AttributePredictor, OnnxAttributePredictor};
use crate::detector::{FaceDetector, YuNetDetector};
use crate::landmark::{LandmarkPredictor, OnnxLandmarkPredictor};
use crate::remap::remap_box;
use crate::render::{FaceOverlay, Renderer};
use crate::types::{AttributeResult, Detection, Landmarks, RemappedBox};

/// The four models, loaded once and shared by every image.
pub struct ModelContext {
    pub detector: Box<dyn FaceDetector>,
    pub landmarks: Box<dyn LandmarkPredictor>,
    pub aligner: Box<dyn FaceAligner>,
    pub attributes: Box<dyn AttributePredictor>,
}

impl ModelContext {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        landmarks: Box<dyn LandmarkPredictor>,
        aligner: Box<dyn FaceAligner>,
        attributes: Box<dyn AttributePredictor>,
    ) -> Self {
        Self {
            detector,
            landmarks,
            aligner,
            attributes,
        }
    }

    /// Load the ONNX-backed implementations named in `settings.models`.
    pub fn from_settings(settings: &AppSettings) -> anyhow::Result<Self> {
        let _guard = timing_guard("faceattr_core::load_models", log::Level::Info);
        let models = &settings.models;
        let detector = YuNetDetector::from_settings(&models.detect, &settings.detection)
            .context("failed to load face detector")?;
        let landmarks = OnnxLandmarkPredictor::new(&models.landmark, &settings.landmark)
            .context("failed to load landmark predictor")?;
        let aligner = SimilarityAligner::from_template_path(models.align.as_deref())
            .context("failed to load alignment template")?;
        let attributes = OnnxAttributePredictor::new(&models.attribute, &settings.attribute)
            .context("failed to load attribute classifier")?;
        info!(
            "models ready: detector={}, landmarks={} ({} points), attributes={}",
            models.detect,
            models.landmark,
            landmarks.count(),
            models.attribute
        );
        Ok(Self::new(
            Box::new(detector),
            Box::new(landmarks),
            Box::new(aligner),
            Box::new(attributes),
        ))
    }
}

/// Output locations and sizes for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Receives `<face index>.jpg`; created on demand.
    pub align_dir: PathBuf,
    /// Annotated frame, overwritten by every image.
    pub annotated_path: PathBuf,
    pub align_size: (u32, u32),
    /// Recorded only. Every detection is processed regardless.
    pub score_threshold: f32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&AppSettings::default())
    }
}

impl From<&AppSettings> for PipelineOptions {
    fn from(settings: &AppSettings) -> Self {
        Self {
            align_dir: PathBuf::from(&settings.output.align_dir),
            annotated_path: PathBuf::from(&settings.output.annotated_path),
            align_size: (settings.align.width, settings.align.height),
            score_threshold: settings.detection.score_threshold,
        }
    }
}

/// Presents an annotated frame and returns once the user dismisses it.
pub trait FrameViewer {
    fn show(&mut self, title: &str, frame: &RgbImage) -> anyhow::Result<()>;
}

/// Viewer for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopViewer;

impl FrameViewer for NoopViewer {
    fn show(&mut self, _title: &str, _frame: &RgbImage) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Step of the per-image flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadImage,
    Detect,
    Landmark,
    Align,
    Attribute,
    WriteOutput,
    Display,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::LoadImage => "image loading",
            Stage::Detect => "face detection",
            Stage::Landmark => "landmark prediction",
            Stage::Align => "face alignment",
            Stage::Attribute => "attribute prediction",
            Stage::WriteOutput => "writing results",
            Stage::Display => "display",
        })
    }
}

/// Fatal failure of one stage; aborts the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} failed for {}", path.display())]
    Stage {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Stage { stage, .. } => *stage,
        }
    }
}

trait StageResult<T> {
    fn at(self, stage: Stage, path: &Path) -> Result<T, PipelineError>;
}

impl<T> StageResult<T> for anyhow::Result<T> {
    fn at(self, stage: Stage, path: &Path) -> Result<T, PipelineError> {
        self.map_err(|source| PipelineError::Stage {
            stage,
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Everything computed for one face.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceReport {
    pub index: usize,
    pub detection: Detection,
    pub region: RemappedBox,
    pub landmarks: Vec<Point>,
    pub attributes: AttributeResult,
    pub aligned_path: PathBuf,
}

/// An image that had at least one face.
#[derive(Debug, Clone)]
pub struct AnnotatedImage {
    pub source: PathBuf,
    pub frame: RgbImage,
    pub annotated_path: PathBuf,
    pub faces: Vec<FaceReport>,
}

/// What happened to one input image.
#[derive(Debug, Clone)]
pub enum ImageOutcome {
    /// No faces; nothing was written.
    Skipped { source: PathBuf },
    Annotated(AnnotatedImage),
}

impl ImageOutcome {
    pub fn faces(&self) -> &[FaceReport] {
        match self {
            ImageOutcome::Skipped { .. } => &[],
            ImageOutcome::Annotated(annotated) => &annotated.faces,
        }
    }
}

/// Runs the models over images and writes results.
pub struct Pipeline<'a> {
    models: &'a ModelContext,
    renderer: Renderer,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(models: &'a ModelContext, renderer: Renderer, options: PipelineOptions) -> Self {
        Self {
            models,
            renderer,
            options,
        }
    }

    /// Process every image in order, showing each annotated frame.
    ///
    /// Stops at the first failing image.
    pub fn run(
        &self,
        images: &[PathBuf],
        viewer: &mut dyn FrameViewer,
    ) -> Result<Vec<ImageOutcome>, PipelineError> {
        let mut outcomes = Vec::with_capacity(images.len());
        for path in images {
            let outcome = self.process_image(path)?;
            if let ImageOutcome::Annotated(annotated) = &outcome {
                viewer
                    .show(&path.display().to_string(), &annotated.frame)
                    .at(Stage::Display, path)?;
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Load and process one image file.
    pub fn process_image(&self, path: &Path) -> Result<ImageOutcome, PipelineError> {
        let image = load_image(path).at(Stage::LoadImage, path)?;
        self.process_frame(&image, path)
    }

    /// Process an already decoded image. `source` names it in logs and errors.
    pub fn process_frame(
        &self,
        image: &DynamicImage,
        source: &Path,
    ) -> Result<ImageOutcome, PipelineError> {
        let _guard = timing_guard("faceattr_core::process_frame", log::Level::Debug);
        let detections = self
            .models
            .detector
            .detect(image, source)
            .at(Stage::Detect, source)?;
        if detections.is_empty() {
            info!("no faces detected in {}; skipping", source.display());
            return Ok(ImageOutcome::Skipped {
                source: source.to_path_buf(),
            });
        }
        info!("{}: {} face(s)", source.display(), detections.len());

        fs::create_dir_all(&self.options.align_dir)
            .with_context(|| format!("failed to create {}", self.options.align_dir.display()))
            .at(Stage::WriteOutput, source)?;

        let original = image.to_rgb8();
        let mut frame = original.clone();
        let mut faces = Vec::with_capacity(detections.len());
        for (index, detection) in detections.into_iter().enumerate() {
            let face = self.process_face(&original, index, detection, source)?;
            self.renderer.draw_face(
                &mut frame,
                &FaceOverlay {
                    detection: &face.report.detection,
                    region: &face.report.region,
                    landmarks: &face.landmarks,
                    attributes: &face.report.attributes,
                },
            );
            faces.push(face.report);
        }

        let annotated_path = self.options.annotated_path.clone();
        if let Some(parent) = annotated_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))
                .at(Stage::WriteOutput, source)?;
        }
        frame
            .save(&annotated_path)
            .with_context(|| format!("failed to write {}", annotated_path.display()))
            .at(Stage::WriteOutput, source)?;

        Ok(ImageOutcome::Annotated(AnnotatedImage {
            source: source.to_path_buf(),
            frame,
            annotated_path,
            faces,
        }))
    }

    fn process_face(
        &self,
        image: &RgbImage,
        index: usize,
        detection: Detection,
        source: &Path,
    ) -> Result<ProcessedFace, PipelineError> {
        let region = remap_box(&detection);

        let landmarks = {
            let _guard = timing_guard("faceattr_core::landmark", log::Level::Info);
            self.models
                .landmarks
                .predict(image, &region)
                .at(Stage::Landmark, source)?
        };
        let expected = self.models.landmarks.count();
        if landmarks.count() != expected {
            return Err(anyhow::anyhow!(
                "landmark predictor returned {} points, expected {}",
                landmarks.len(),
                expected
            ))
            .at(Stage::Landmark, source);
        }

        let aligned = {
            let _guard = timing_guard("faceattr_core::align", log::Level::Info);
            let mut batch = self
                .models
                .aligner
                .align(image, std::slice::from_ref(&landmarks), self.options.align_size)
                .at(Stage::Align, source)?;
            match (batch.pop(), batch.is_empty()) {
                (Some(face), true) => face,
                _ => {
                    return Err(anyhow::anyhow!("aligner must return one face per landmark set"))
                        .at(Stage::Align, source);
                }
            }
        };

        let aligned_path = self.options.align_dir.join(format!("{index}.jpg"));
        aligned
            .save(&aligned_path)
            .with_context(|| format!("failed to write {}", aligned_path.display()))
            .at(Stage::WriteOutput, source)?;

        let attributes = {
            let _guard = timing_guard("faceattr_core::attribute", log::Level::Info);
            let input = convert_channel_order(&aligned, self.models.attributes.channel_order());
            self.models
                .attributes
                .predict(&input)
                .at(Stage::Attribute, source)?
        };
        debug!(
            "face {index}: score {:.2}, region {:?}, {} / {} / {} ({})",
            detection.score,
            region,
            attributes.gender,
            attributes.age,
            attributes.expression.0,
            attributes.expression.1
        );

        Ok(ProcessedFace {
            report: FaceReport {
                index,
                detection,
                region,
                landmarks: landmarks.points().to_vec(),
                attributes,
                aligned_path,
            },
            landmarks,
        })
    }
}

struct ProcessedFace {
    landmarks: Landmarks,
    report: FaceReport,
}
