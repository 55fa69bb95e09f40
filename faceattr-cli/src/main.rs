//! Command-line driver: detect faces, predict attributes and show the result.

mod args;
mod config;
mod types;
mod viewer;

use std::fs::{self, File};

use anyhow::{Context, Result};
use clap::Parser;
use faceattr_core::{
    FrameViewer, ImageOutcome, ModelContext, NoopViewer, Pipeline, PipelineOptions, Renderer,
};
use faceattr_utils::{configure_telemetry, init_logging};
use log::info;

use crate::{
    args::AttributeArgs,
    config::{apply_cli_overrides, load_settings, parse_images},
    types::ImageRecord,
    viewer::WindowViewer,
};

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let args = AttributeArgs::parse();

    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, &args)?;
    configure_telemetry(
        settings.telemetry.enabled,
        settings.telemetry.level_filter(),
    );

    let images = parse_images(&args.images);
    if images.is_empty() {
        anyhow::bail!("no images given; pass a comma-separated list with --images");
    }

    let models = ModelContext::from_settings(&settings)?;
    let renderer = Renderer::new(&settings.render);
    let pipeline = Pipeline::new(&models, renderer, PipelineOptions::from(&settings));

    let mut viewer: Box<dyn FrameViewer> = if settings.output.display {
        Box::new(WindowViewer)
    } else {
        Box::new(NoopViewer)
    };

    info!("Processing {} image(s)...", images.len());
    let outcomes = pipeline.run(&images, viewer.as_mut())?;

    let annotated = outcomes
        .iter()
        .filter(|o| matches!(o, ImageOutcome::Annotated(_)))
        .count();
    let faces: usize = outcomes.iter().map(|o| o.faces().len()).sum();
    info!(
        "Done: {annotated} annotated, {} skipped, {faces} face(s)",
        outcomes.len() - annotated
    );

    if let Some(json_path) = args.json.as_ref() {
        if let Some(dir) = json_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        let records: Vec<ImageRecord> = outcomes.iter().map(ImageRecord::from).collect();
        let file = File::create(json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        serde_json::to_writer_pretty(file, &records)
            .with_context(|| format!("failed to write report JSON to {}", json_path.display()))?;
        info!("Wrote report to {}", json_path.display());
    }

    Ok(())
}
