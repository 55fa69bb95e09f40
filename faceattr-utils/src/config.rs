//! Shared configuration types consumed across the faceattr workspace.
//!
//! Every section uses `#[serde(default)]`, so a settings file only needs the
//! keys it wants to change. CLI flags are applied on top of the loaded values.

use crate::image_utils::ChannelOrder;

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Locations of the four model artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelPaths {
    /// Face detector ONNX graph.
    pub detect: String,
    /// Landmark regressor ONNX graph.
    pub landmark: String,
    /// Alignment template JSON. `None` selects the built-in template.
    pub align: Option<String>,
    /// Attribute classifier ONNX graph.
    pub attribute: String,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            detect: "models/face_detection_yunet_2023mar.onnx".into(),
            landmark: "models/face_landmark_5pt.onnx".into(),
            align: None,
            attribute: "models/face_attribute.onnx".into(),
        }
    }
}

/// Resize filter preference for model inputs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeQuality {
    /// Triangle filter.
    #[default]
    Quality,
    /// Nearest filter.
    Speed,
}

/// Model input resolution in pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputDimensions {
    pub width: u32,
    pub height: u32,
    pub resize_quality: ResizeQuality,
}

impl InputDimensions {
    pub const fn square(side: u32) -> Self {
        Self {
            width: side,
            height: side,
            resize_quality: ResizeQuality::Quality,
        }
    }
}

impl Default for InputDimensions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 640,
            resize_quality: ResizeQuality::Speed,
        }
    }
}

/// Per-channel `(value - mean) / std` applied when building input tensors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalization {
    /// Scale 0..255 to 0..1.
    pub const UNIT: Normalization = Normalization {
        mean: [0.0; 3],
        std: [255.0; 3],
    };

    /// ImageNet statistics expressed in 0..255 pixel units.
    pub const IMAGENET: Normalization = Normalization {
        mean: [123.675, 116.28, 103.53],
        std: [58.395, 57.12, 57.375],
    };
}

impl Default for Normalization {
    fn default() -> Self {
        Self::UNIT
    }
}

/// Detector parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    /// Detector input resolution.
    pub input: InputDimensions,
    /// Candidates below this score are discarded while decoding the detector head.
    pub model_score_floor: f32,
    /// IoU above which overlapping candidates are suppressed.
    pub nms_threshold: f32,
    /// Maximum candidates kept before suppression.
    pub top_k: usize,
    /// User-facing visualization threshold (`--thresh`).
    ///
    /// Recorded for compatibility only: the pipeline processes every detection
    /// the detector returns, whatever this value is.
    pub score_threshold: f32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            input: InputDimensions::default(),
            model_score_floor: 0.5,
            nms_threshold: 0.3,
            top_k: 5_000,
            score_threshold: 0.5,
        }
    }
}

/// Landmark regressor parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LandmarkSettings {
    /// Points per face; the supported models emit 5 or 3.
    pub points: usize,
    pub input: InputDimensions,
    pub normalization: Normalization,
}

impl Default for LandmarkSettings {
    fn default() -> Self {
        Self {
            points: 5,
            input: InputDimensions::square(112),
            normalization: Normalization::UNIT,
        }
    }
}

/// Aligned face size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AlignSettings {
    pub width: u32,
    pub height: u32,
}

impl Default for AlignSettings {
    fn default() -> Self {
        Self {
            width: 96,
            height: 96,
        }
    }
}

/// Attribute classifier parameters and label tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AttributeSettings {
    pub input: InputDimensions,
    pub normalization: Normalization,
    /// Channel order the classifier was trained on.
    pub channel_order: ChannelOrder,
    pub gender_labels: Vec<String>,
    pub age_labels: Vec<String>,
    pub expression_labels: Vec<String>,
}

impl Default for AttributeSettings {
    fn default() -> Self {
        fn labels(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }
        Self {
            input: InputDimensions::square(96),
            normalization: Normalization::IMAGENET,
            channel_order: ChannelOrder::Rgb,
            gender_labels: labels(&["female", "male"]),
            age_labels: labels(&["0-10", "11-20", "21-30", "31-40", "41-50", "51-60", "60+"]),
            expression_labels: labels(&[
                "neutral", "happy", "surprise", "sad", "angry", "disgust", "fear", "contempt",
            ]),
        }
    }
}

/// Where results go.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputSettings {
    /// Directory receiving `<face index>.jpg` aligned crops.
    pub align_dir: String,
    /// Annotated frame path, overwritten for every image.
    pub annotated_path: String,
    /// Show each annotated frame in a window and wait for a key press.
    pub display: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            align_dir: "align_result".into(),
            annotated_path: "result_attribute_v1.jpg".into(),
            display: true,
        }
    }
}

/// Overlay drawing parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderSettings {
    /// TrueType font for labels. When unset, common system fonts are probed.
    pub font_path: Option<String>,
    pub box_thickness: u32,
    pub landmark_radius: i32,
    /// Pixel height of the detection label.
    pub label_scale: f32,
    /// Pixel height of the attribute lines.
    pub attribute_scale: f32,
    /// Vertical distance between attribute lines.
    pub line_spacing: i32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            font_path: None,
            box_thickness: 3,
            landmark_radius: 2,
            label_scale: 20.0,
            attribute_scale: 15.0,
            line_spacing: 20,
        }
    }
}

/// Inference runtime preferences carried over from the original command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Requested GPU device ids; empty means CPU.
    pub gpus: Vec<usize>,
    /// Whether pretrained weights were requested.
    pub pretrained: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            gpus: Vec::new(),
            pretrained: true,
        }
    }
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    /// error, warn, info, debug or trace.
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Info,
        }
    }
}

/// Everything the pipeline needs, loadable from and savable to JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub models: ModelPaths,
    pub detection: DetectionSettings,
    pub landmark: LandmarkSettings,
    pub align: AlignSettings,
    pub attribute: AttributeSettings,
    pub output: OutputSettings,
    pub render: RenderSettings,
    pub runtime: RuntimeSettings,
    pub telemetry: TelemetrySettings,
}

impl AppSettings {
    /// Load settings from a JSON file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let settings: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;
        Ok(settings)
    }
}

/// Settings file picked up when `--config` is not given (`config/faceattr_settings.json`).
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/faceattr_settings.json"))
        .unwrap_or_else(|_| PathBuf::from("config/faceattr_settings.json"))
}
