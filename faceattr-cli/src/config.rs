//! Configuration loading and CLI override logic.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use faceattr_core::LandmarkCount;
use faceattr_utils::{
    config::{AppSettings, default_settings_path},
    normalize_path,
};
use log::{info, warn};

use crate::args::AttributeArgs;

/// Load application settings from a file or use defaults.
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<AppSettings> {
    if let Some(path) = config_path {
        let resolved = normalize_path(path)?;
        let settings = AppSettings::load_from_path(&resolved)?;
        info!("Loaded settings from {}", resolved.display());
        Ok(settings)
    } else {
        let default_path = default_settings_path();
        if default_path.exists() {
            let settings = AppSettings::load_from_path(&default_path).with_context(|| {
                format!(
                    "failed to load default settings from {}",
                    default_path.display()
                )
            })?;
            info!("Loaded settings from {}", default_path.display());
            Ok(settings)
        } else {
            Ok(AppSettings::default())
        }
    }
}

/// Apply command-line arguments on top of loaded or default settings.
pub fn apply_cli_overrides(settings: &mut AppSettings, args: &AttributeArgs) -> Result<()> {
    if let Some(path) = args.model_detect.as_ref() {
        settings.models.detect = path_string(path);
    }
    if let Some(path) = args.model_landmark.as_ref() {
        settings.models.landmark = path_string(path);
    }
    if let Some(path) = args.model_align.as_ref() {
        settings.models.align = Some(path_string(path));
    }
    if let Some(path) = args.model_attribute.as_ref() {
        settings.models.attribute = path_string(path);
    }

    if let Some(gpus) = args.gpus.as_deref() {
        settings.runtime.gpus = parse_gpus(gpus)?;
    }
    if let Some(flag) = args.pretrained.as_deref() {
        settings.runtime.pretrained = parse_bool(flag)?;
    }
    if let Some(thresh) = args.thresh {
        settings.detection.score_threshold = thresh;
    }

    if let Some(points) = args.landmarks {
        settings.landmark.points = LandmarkCount::try_from(points)?.get();
    }
    if let Some((width, height)) = args.align_size {
        settings.align.width = width;
        settings.align.height = height;
    }
    if let Some(dir) = args.align_dir.as_ref() {
        settings.output.align_dir = path_string(dir);
    }
    if let Some(path) = args.output.as_ref() {
        settings.output.annotated_path = path_string(path);
    }
    if let Some(font) = args.font.as_ref() {
        settings.render.font_path = Some(path_string(font));
    }
    if args.no_display {
        settings.output.display = false;
    }

    if args.telemetry {
        settings.telemetry.enabled = true;
    }
    if let Some(level) = args.telemetry_level.as_ref() {
        let normalized = level.trim();
        if !normalized.is_empty() {
            let lower = normalized.to_ascii_lowercase();
            settings.telemetry.level = lower.clone();
            if lower == "off" {
                settings.telemetry.enabled = false;
            }
        }
    }

    if !settings.runtime.gpus.is_empty() {
        warn!(
            "GPU ids {:?} requested, but inference runs on the CPU",
            settings.runtime.gpus
        );
    }
    Ok(())
}

/// Split the `--images` list, dropping blank entries.
pub fn parse_images(list: &str) -> Vec<PathBuf> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Parse a comma-separated device list such as `0,1`. Blank means none.
pub fn parse_gpus(list: &str) -> Result<Vec<usize>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|id| {
            id.parse::<usize>()
                .with_context(|| format!("invalid GPU id '{id}' in --gpus"))
        })
        .collect()
}

/// Accepts the usual spellings of true and false, case-insensitively.
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        other => anyhow::bail!("invalid boolean '{other}'; expected True or False"),
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
