//! Common helpers shared across the faceattr crates.

/// Application configuration and settings management.
pub mod config;
/// Image loading, cropping, channel conversion and tensor layout.
pub mod image_utils;
/// Minimal 2D point arithmetic used by landmark and alignment code.
pub mod point;
/// Instrumentation helpers for optional performance tracing.
pub mod telemetry;

use std::path::Path;

use anyhow::Result;
use log::LevelFilter;

pub use config::{AppSettings, default_settings_path};
pub use image_utils::{
    ChannelOrder, compute_resize_scales, convert_channel_order, crop_padded, load_image,
    resize_image, rgb_to_bgr_chw, rgb_to_chw_normalized,
};
pub use point::Point;
pub use telemetry::{TimingGuard, configure as configure_telemetry, telemetry_allows, timing_guard};

/// Initialize logging once for the CLI.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(telemetry::TELEMETRY_TARGET, LevelFilter::Trace);

    // A second init (tests, embedding) is harmless.
    let _ = builder.try_init();
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<std::path::PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_rejects_missing() {
        let err = normalize_path("definitely/not/here.jpg").expect_err("missing path");
        assert!(err.to_string().contains("path does not exist"));
    }

    #[test]
    fn normalize_path_resolves_existing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolved = normalize_path(dir.path()).expect("resolve");
        assert!(resolved.is_absolute());
    }
}
