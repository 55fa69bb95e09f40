//! Overlay drawing for annotated frames.

use std::{fs, path::Path};

use ab_glyph::{FontVec, PxScale};
use faceattr_utils::config::RenderSettings;
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};
use log::{debug, warn};

use crate::types::{AttributeResult, Detection, Landmarks, RemappedBox};

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const LABEL_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const LANDMARK_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const ATTRIBUTE_COLOR: Rgb<u8> = Rgb([0, 128, 216]);

/// Probed in order when no font is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    r"C:\Windows\Fonts\arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
];

/// Everything drawn for one face.
#[derive(Debug, Clone, Copy)]
pub struct FaceOverlay<'a> {
    pub detection: &'a Detection,
    pub region: &'a RemappedBox,
    pub landmarks: &'a Landmarks,
    pub attributes: &'a AttributeResult,
}

/// Draws boxes, landmarks and labels onto frames.
///
/// Text needs a TrueType font. Without one, only shapes are drawn.
pub struct Renderer {
    font: Option<FontVec>,
    style: RenderSettings,
}

impl Renderer {
    /// Build a renderer, loading `settings.font_path` or the first system
    /// font found.
    pub fn new(settings: &RenderSettings) -> Self {
        let font = match settings.font_path.as_deref() {
            Some(path) => load_font(Path::new(path)),
            None => SYSTEM_FONTS
                .iter()
                .map(Path::new)
                .filter(|p| p.exists())
                .find_map(load_font),
        };
        if font.is_none() {
            warn!("no usable font found; text overlays will be skipped");
        }
        Self::with_font(font, settings)
    }

    pub fn with_font(font: Option<FontVec>, settings: &RenderSettings) -> Self {
        Self {
            font,
            style: settings.clone(),
        }
    }

    /// Draw one face's overlays in place.
    pub fn draw_face(&self, frame: &mut RgbImage, face: &FaceOverlay<'_>) {
        let region = face.region;
        self.draw_box(frame, region);

        let label = format!("{}{:.2}", face.detection.class_name, face.detection.score);
        self.draw_line(
            frame,
            &label,
            region.x_min,
            region.y_min - 5,
            self.style.label_scale,
            LABEL_COLOR,
        );

        for point in face.landmarks.points() {
            draw_filled_circle_mut(
                frame,
                point.rounded(),
                self.style.landmark_radius,
                LANDMARK_COLOR,
            );
        }

        let attrs = face.attributes;
        let lines = [
            format!("g:{}", attrs.gender),
            format!("a:{}", attrs.age),
            format!("e:{}", attrs.expression.0),
            format!(" :{}", attrs.expression.1),
        ];
        let x = region.x_max + 5;
        for (row, text) in lines.iter().enumerate() {
            let baseline = region.y_min + 10 + row as i32 * self.style.line_spacing;
            self.draw_line(frame, text, x, baseline, self.style.attribute_scale, ATTRIBUTE_COLOR);
        }
    }

    fn draw_box(&self, frame: &mut RgbImage, region: &RemappedBox) {
        let width = region.width().max(1) as u32;
        let height = region.height().max(1) as u32;
        let thickness = self.style.box_thickness.max(1);
        // Grow outwards and inwards around the nominal edge.
        let inner = (thickness / 2) as i32;
        for i in 0..thickness as i32 {
            let offset = i - inner;
            let (w, h) = (
                (width as i32 + 2 * offset).max(1) as u32,
                (height as i32 + 2 * offset).max(1) as u32,
            );
            let rect = Rect::at(region.x_min - offset, region.y_min - offset).of_size(w, h);
            draw_hollow_rect_mut(frame, rect, BOX_COLOR);
        }
    }

    /// `baseline` is where the bottom of the glyphs sits.
    fn draw_line(&self, frame: &mut RgbImage, text: &str, x: i32, baseline: i32, scale: f32, color: Rgb<u8>) {
        let Some(font) = &self.font else {
            return;
        };
        let top = baseline - scale.round() as i32;
        draw_text_mut(frame, color, x, top, PxScale::from(scale), font, text);
    }
}

fn load_font(path: &Path) -> Option<FontVec> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("failed to read font {}: {err}", path.display());
            return None;
        }
    };
    match FontVec::try_from_vec(bytes) {
        Ok(font) => {
            debug!("using font {}", path.display());
            Some(font)
        }
        Err(err) => {
            warn!("{} is not a usable font: {err}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faceattr_utils::Point;

    use crate::types::LandmarkCount;

    fn fixtures() -> (Detection, RemappedBox, Landmarks, AttributeResult) {
        let detection = Detection {
            xmin: 20.0,
            ymin: 10.0,
            xmax: 60.0,
            ymax: 70.0,
            score: 0.93,
            class_name: "face".into(),
        };
        let region = RemappedBox {
            x_min: 20,
            y_min: 30,
            x_max: 60,
            y_max: 70,
        };
        let landmarks = Landmarks::new(
            vec![
                Point::new(30.0, 40.0),
                Point::new(50.0, 40.0),
                Point::new(40.0, 50.0),
                Point::new(32.0, 60.0),
                Point::new(48.0, 60.0),
            ],
            LandmarkCount::Five,
        )
        .unwrap();
        let attributes = AttributeResult {
            gender: "female".into(),
            age: "21-30".into(),
            expression: ("happy".into(), "neutral".into()),
        };
        (detection, region, landmarks, attributes)
    }

    #[test]
    fn shapes_are_drawn_without_a_font() {
        let renderer = Renderer::with_font(None, &RenderSettings::default());
        assert!(renderer.font.is_none());
        let (detection, region, landmarks, attributes) = fixtures();
        let mut frame = RgbImage::new(100, 100);
        renderer.draw_face(
            &mut frame,
            &FaceOverlay {
                detection: &detection,
                region: &region,
                landmarks: &landmarks,
                attributes: &attributes,
            },
        );

        assert_eq!(frame.get_pixel(20, 30), &BOX_COLOR);
        assert_eq!(frame.get_pixel(40, 69), &BOX_COLOR);
        // Thickness 3 reaches one pixel outside the nominal edge.
        assert_eq!(frame.get_pixel(19, 40), &BOX_COLOR);
        assert_eq!(frame.get_pixel(30, 40), &LANDMARK_COLOR);
        assert_eq!(frame.get_pixel(40, 50), &LANDMARK_COLOR);
        assert_eq!(frame.get_pixel(90, 5), &Rgb([0, 0, 0]));
    }

    #[test]
    fn regions_off_the_frame_do_not_panic() {
        let renderer = Renderer::with_font(None, &RenderSettings::default());
        let (detection, _, landmarks, attributes) = fixtures();
        let region = RemappedBox {
            x_min: -50,
            y_min: -40,
            x_max: 10,
            y_max: 20,
        };
        let mut frame = RgbImage::new(32, 32);
        renderer.draw_face(
            &mut frame,
            &FaceOverlay {
                detection: &detection,
                region: &region,
                landmarks: &landmarks,
                attributes: &attributes,
            },
        );
        assert_eq!(frame.get_pixel(10, 5), &BOX_COLOR);
    }

    #[test]
    fn unreadable_font_path_falls_back_to_no_text() {
        let settings = RenderSettings {
            font_path: Some("/definitely/not/a/font.ttf".into()),
            ..Default::default()
        };
        assert!(Renderer::new(&settings).font.is_none());
    }
}
