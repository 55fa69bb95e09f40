//! Detector box to landmark-model framing.
//!
//! The landmark regressor was trained on square crops sized from the face
//! height and shifted towards the chin. Width of the detector box only
//! contributes its centre.

use crate::types::{Detection, RemappedBox};

/// Side of the square crop relative to the detection height.
pub const SIZE_SCALE: f32 = 0.75;
/// Downward shift of the crop centre relative to the detection height.
pub const CENTER_SCALE: f32 = 0.1;

/// Map a detection to the square landmark region.
///
/// The result is not clamped to the image.
pub fn remap_box(detection: &Detection) -> RemappedBox {
    let height = detection.ymax - detection.ymin;
    let side = height * SIZE_SCALE;
    let half = side / 2.0;

    let x_center = detection.xmin + (detection.xmax - detection.xmin) / 2.0;
    let y_center = detection.ymin + height / 2.0 + height * CENTER_SCALE;

    RemappedBox {
        x_min: (x_center - half).round() as i32,
        y_min: (y_center - half).round() as i32,
        x_max: (x_center + half).round() as i32,
        y_max: (y_center + half).round() as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Detection {
        Detection {
            xmin,
            ymin,
            xmax,
            ymax,
            score: 0.97,
            class_name: "face".into(),
        }
    }

    #[test]
    fn tall_box_maps_to_known_region() {
        let remapped = remap_box(&det(100.0, 50.0, 200.0, 250.0));
        assert_eq!(
            remapped,
            RemappedBox {
                x_min: 75,
                y_min: 95,
                x_max: 225,
                y_max: 245,
            }
        );
    }

    #[test]
    fn output_is_square_and_sized_from_height() {
        for (w, h) in [(40.0f32, 60.0f32), (120.0, 33.0), (17.5, 91.25), (300.0, 300.0)] {
            let remapped = remap_box(&det(13.0, 7.0, 13.0 + w, 7.0 + h));
            let expected = (h * SIZE_SCALE).round() as i32;
            assert!((remapped.width() - expected).abs() <= 1, "width for {w}x{h}");
            assert!((remapped.height() - expected).abs() <= 1, "height for {w}x{h}");
            assert!((remapped.width() - remapped.height()).abs() <= 1);
        }
    }

    #[test]
    fn centre_moves_down_by_a_tenth_of_height() {
        let d = det(10.0, 20.0, 90.0, 220.0);
        let r = remap_box(&d);
        let (cx, cy) = ((r.x_min + r.x_max) as f32 / 2.0, (r.y_min + r.y_max) as f32 / 2.0);
        assert!((cx - 50.0).abs() <= 1.0);
        assert!((cy - (20.0 + 0.6 * 200.0)).abs() <= 1.0);
    }

    #[test]
    fn boxes_may_leave_the_image() {
        let remapped = remap_box(&det(-30.0, -40.0, 10.0, 0.0));
        assert!(remapped.x_min < 0);
        assert!(remapped.y_min < 0);
    }

    #[test]
    fn remapping_is_pure() {
        let d = det(5.5, 6.5, 70.25, 99.75);
        let before = d.clone();
        assert_eq!(remap_box(&d), remap_box(&d));
        assert_eq!(d, before);
    }
}
