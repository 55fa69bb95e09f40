//! Blocking window that shows an annotated frame until a key is pressed.

use anyhow::Result;
use eframe::{App, CreationContext, Frame, NativeOptions, egui};
use egui::{ColorImage, TextureHandle, TextureOptions};
use faceattr_core::FrameViewer;
use image::RgbImage;
use log::debug;

/// Opens one native window per frame.
#[derive(Debug, Default)]
pub struct WindowViewer;

impl FrameViewer for WindowViewer {
    fn show(&mut self, title: &str, frame: &RgbImage) -> Result<()> {
        let (width, height) = frame.dimensions();
        let image = ColorImage::from_rgb([width as usize, height as usize], frame.as_raw());

        let mut options = NativeOptions::default();
        options.viewport = options
            .viewport
            .with_title(title)
            .with_inner_size([width as f32, height as f32]);
        // Return control after the window closes so the next image can open one.
        options.run_and_return = true;

        debug!("showing {title} ({width}x{height}); press any key to continue");
        let title = title.to_string();
        eframe::run_native(
            "faceattr",
            options,
            Box::new(move |cc| Ok(Box::new(FrameApp::new(cc, &title, image)))),
        )
        .map_err(|err| anyhow::anyhow!("display window failed: {err}"))
    }
}

struct FrameApp {
    texture: TextureHandle,
}

impl FrameApp {
    fn new(cc: &CreationContext<'_>, name: &str, image: ColorImage) -> Self {
        let texture = cc.egui_ctx.load_texture(name, image, TextureOptions::LINEAR);
        Self { texture }
    }
}

impl App for FrameApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        let key_pressed = ctx.input(|i| {
            i.events
                .iter()
                .any(|e| matches!(e, egui::Event::Key { pressed: true, .. }))
        });
        if key_pressed {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                ui.add(egui::Image::new(&self.texture).shrink_to_fit());
            });
    }
}
