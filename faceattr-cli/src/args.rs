//! Command-line argument definitions for faceattr.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Detect faces, locate landmarks, align each face and predict its gender,
/// age and expression.
#[derive(Debug, Parser)]
#[command(name = "faceattr", author, version, about)]
pub struct AttributeArgs {
    /// Face detector ONNX model [default: models/face_detection_yunet_2023mar.onnx].
    #[arg(long, value_name = "PATH")]
    pub model_detect: Option<PathBuf>,

    /// Landmark regressor ONNX model [default: models/face_landmark_5pt.onnx].
    #[arg(long, value_name = "PATH")]
    pub model_landmark: Option<PathBuf>,

    /// Alignment template JSON. The built-in 96x96 template is used when unset.
    #[arg(long, value_name = "PATH")]
    pub model_align: Option<PathBuf>,

    /// Attribute classifier ONNX model [default: models/face_attribute.onnx].
    #[arg(long, value_name = "PATH")]
    pub model_attribute: Option<PathBuf>,

    /// Comma-separated list of images to process.
    #[arg(long, default_value = "./friends.jpg")]
    pub images: String,

    /// Comma-separated GPU ids. Inference always runs on the CPU; a non-empty
    /// list only produces a warning.
    #[arg(long, value_name = "IDS")]
    pub gpus: Option<String>,

    /// Whether pretrained weights are requested (True/False). Recorded only.
    #[arg(long, value_name = "BOOL")]
    pub pretrained: Option<String>,

    /// Visualization threshold. Recorded only; every detection is processed.
    #[arg(long)]
    pub thresh: Option<f32>,

    /// Optional settings JSON. Defaults to `config/faceattr_settings.json` when present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Landmarks per face: 5 or 3.
    #[arg(long, value_name = "N")]
    pub landmarks: Option<usize>,

    /// Aligned face size as WIDTHxHEIGHT, e.g. 96x96.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub align_size: Option<(u32, u32)>,

    /// Directory for aligned face crops.
    #[arg(long, value_name = "DIR")]
    pub align_dir: Option<PathBuf>,

    /// Path of the annotated frame.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Write a per-face JSON report to this file.
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// TrueType font for overlay text.
    #[arg(long, value_name = "TTF")]
    pub font: Option<PathBuf>,

    /// Do not open a window for each annotated frame.
    #[arg(long = "no-display", action = ArgAction::SetTrue)]
    pub no_display: bool,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,
}

/// Parse `WIDTHxHEIGHT`.
pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size '{value}'; expected WIDTHxHEIGHT"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<u32>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| format!("invalid size '{value}'; dimensions must be positive integers"))
    };
    Ok((parse(w)?, parse(h)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_parse() {
        assert_eq!(parse_size("96x96"), Ok((96, 96)));
        assert_eq!(parse_size(" 112X128 "), Ok((112, 128)));
        assert!(parse_size("96").is_err());
        assert!(parse_size("0x96").is_err());
    }

    #[test]
    fn defaults_match_the_classic_invocation() {
        let args = AttributeArgs::parse_from(["faceattr"]);
        assert_eq!(args.images, "./friends.jpg");
        assert!(args.model_detect.is_none());
        assert!(args.thresh.is_none());
        assert!(!args.no_display);
    }

    #[test]
    fn legacy_flag_names_are_accepted() {
        let args = AttributeArgs::parse_from([
            "faceattr",
            "--model-detect",
            "d.onnx",
            "--model-landmark",
            "l.onnx",
            "--model-align",
            "a.json",
            "--model-attribute",
            "attr.onnx",
            "--images",
            "a.jpg,b.jpg",
            "--gpus",
            "0",
            "--pretrained",
            "False",
            "--thresh",
            "0.8",
        ]);
        assert_eq!(args.model_align, Some(PathBuf::from("a.json")));
        assert_eq!(args.gpus.as_deref(), Some("0"));
        assert_eq!(args.thresh, Some(0.8));
    }
}
