//! Landmark-driven face alignment.
//!
//! A similarity transform (uniform scale, rotation, translation) is fitted by
//! least squares from the detected landmarks onto a reference template, then
//! the source frame is warped through it into the aligned crop.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use faceattr_utils::{Point, timing_guard};
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use serde::{Deserialize, Serialize};

use crate::types::{AlignedFace, LandmarkCount, Landmarks};

/// Produces canonical-pose crops from landmark sets.
pub trait FaceAligner {
    /// Align every landmark set in `batch`; output order matches `batch`.
    fn align(&self, image: &RgbImage, batch: &[Landmarks], size: (u32, u32)) -> Result<Vec<AlignedFace>>;
}

/// Reference keypoint positions inside an aligned crop of `size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignTemplate {
    /// Crop size the coordinates refer to, `[width, height]`.
    pub size: [u32; 2],
    /// Eyes, nose tip, mouth corners.
    pub five: [[f32; 2]; 5],
    /// Eyes, nose tip.
    pub three: [[f32; 2]; 3],
}

impl AlignTemplate {
    /// ArcFace reference points rescaled to a 96x96 crop.
    pub fn builtin() -> Self {
        let five = [
            [32.82, 44.31],
            [63.03, 44.14],
            [48.02, 61.49],
            [35.61, 79.17],
            [60.63, 79.03],
        ];
        Self {
            size: [96, 96],
            five,
            three: [five[0], five[1], five[2]],
        }
    }

    /// Read a template from JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read alignment template {}", path.display()))?;
        let template: AlignTemplate = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse alignment template {}", path.display()))?;
        anyhow::ensure!(
            template.size[0] > 0 && template.size[1] > 0,
            "alignment template {} has an empty size",
            path.display()
        );
        Ok(template)
    }

    /// Template points for `count`, rescaled to a crop of `size`.
    pub fn points_for(&self, count: LandmarkCount, size: (u32, u32)) -> Vec<Point> {
        let sx = size.0 as f32 / self.size[0] as f32;
        let sy = size.1 as f32 / self.size[1] as f32;
        let raw: &[[f32; 2]] = match count {
            LandmarkCount::Five => &self.five,
            LandmarkCount::Three => &self.three,
        };
        raw.iter().map(|&[x, y]| Point::new(x * sx, y * sy)).collect()
    }
}

impl Default for AlignTemplate {
    fn default() -> Self {
        Self::builtin()
    }
}

/// `q = [a -b; b a] p + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl SimilarityTransform {
    /// Least-squares fit mapping `src` onto `dst`.
    pub fn estimate(src: &[Point], dst: &[Point]) -> Result<Self> {
        anyhow::ensure!(
            src.len() == dst.len(),
            "cannot fit {} landmarks to {} template points",
            src.len(),
            dst.len()
        );
        anyhow::ensure!(src.len() >= 2, "at least two points are needed for alignment");
        let (Some(src_c), Some(dst_c)) = (Point::centroid(src), Point::centroid(dst)) else {
            anyhow::bail!("no points to align");
        };

        let mut spread = 0.0f32;
        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        for (&p, &q) in src.iter().zip(dst) {
            let (p, q) = (p - src_c, q - dst_c);
            spread += p.norm_sq();
            dot += p * q;
            cross += p.cross(q);
        }
        anyhow::ensure!(spread > f32::EPSILON, "landmarks are degenerate (all coincide)");

        let a = dot / spread;
        let b = cross / spread;
        let mapped = Self { a, b, tx: 0.0, ty: 0.0 }.apply(src_c);
        Ok(Self {
            a,
            b,
            tx: dst_c.x - mapped.x,
            ty: dst_c.y - mapped.y,
        })
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x - self.b * p.y + self.tx,
            self.b * p.x + self.a * p.y + self.ty,
        )
    }

    fn projection(&self) -> Option<Projection> {
        Projection::from_matrix([self.a, -self.b, self.tx, self.b, self.a, self.ty, 0.0, 0.0, 1.0])
    }
}

/// Aligner fitting a [`SimilarityTransform`] onto an [`AlignTemplate`].
#[derive(Debug, Clone, Default)]
pub struct SimilarityAligner {
    template: AlignTemplate,
}

impl SimilarityAligner {
    pub fn new(template: AlignTemplate) -> Self {
        Self { template }
    }

    /// Template from `path` when given, the built-in one otherwise.
    pub fn from_template_path<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let template = match path {
            Some(path) => AlignTemplate::load(path)?,
            None => AlignTemplate::builtin(),
        };
        Ok(Self::new(template))
    }

    pub fn template(&self) -> &AlignTemplate {
        &self.template
    }

    fn align_one(&self, image: &RgbImage, landmarks: &Landmarks, size: (u32, u32)) -> Result<AlignedFace> {
        let reference = self.template.points_for(landmarks.count(), size);
        let transform = SimilarityTransform::estimate(landmarks.points(), &reference)?;
        let projection = transform
            .projection()
            .context("alignment transform is not invertible")?;

        let mut aligned = RgbImage::new(size.0, size.1);
        warp_into(
            image,
            &projection,
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
            &mut aligned,
        );
        Ok(aligned)
    }
}

impl FaceAligner for SimilarityAligner {
    fn align(&self, image: &RgbImage, batch: &[Landmarks], size: (u32, u32)) -> Result<Vec<AlignedFace>> {
        let _guard = timing_guard("faceattr_core::align_batch", log::Level::Trace);
        anyhow::ensure!(size.0 > 0 && size.1 > 0, "aligned face size must be non-zero");
        batch
            .iter()
            .map(|landmarks| self.align_one(image, landmarks, size))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn points(raw: &[[f32; 2]]) -> Vec<Point> {
        raw.iter().copied().map(Point::from).collect()
    }

    #[test]
    fn identical_sets_give_identity() {
        let template = AlignTemplate::builtin();
        let pts = template.points_for(LandmarkCount::Five, (96, 96));
        let t = SimilarityTransform::estimate(&pts, &pts).expect("fit");
        assert!((t.a - 1.0).abs() < 1e-4);
        assert!(t.b.abs() < 1e-4);
        assert!(t.tx.abs() < 1e-3 && t.ty.abs() < 1e-3);
    }

    #[test]
    fn recovers_scale_rotation_and_shift() {
        let src = points(&[[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]]);
        // 90 degree rotation, scale 2, shift (5, 7).
        let dst = points(&[[5.0, 7.0], [5.0, 27.0], [-15.0, 7.0]]);
        let t = SimilarityTransform::estimate(&src, &dst).expect("fit");
        assert!(t.a.abs() < 1e-4);
        assert!((t.b - 2.0).abs() < 1e-4);
        assert!((t.a.hypot(t.b) - 2.0).abs() < 1e-4);
        for (p, q) in src.iter().zip(&dst) {
            let mapped = t.apply(*p);
            assert!((mapped.x - q.x).abs() < 1e-3 && (mapped.y - q.y).abs() < 1e-3);
        }
    }

    #[test]
    fn degenerate_landmarks_are_rejected() {
        let src = vec![Point::new(3.0, 3.0); 3];
        let dst = points(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        assert!(SimilarityTransform::estimate(&src, &dst).is_err());
    }

    #[test]
    fn template_rescales_to_requested_size() {
        let template = AlignTemplate::builtin();
        let pts = template.points_for(LandmarkCount::Three, (192, 48));
        assert_eq!(pts.len(), 3);
        assert!((pts[0].x - 65.64).abs() < 1e-3);
        assert!((pts[0].y - 22.155).abs() < 1e-3);
    }

    #[test]
    fn aligned_batch_matches_input_and_size() {
        let frame = RgbImage::from_pixel(200, 200, Rgb([90, 120, 150]));
        let aligner = SimilarityAligner::default();
        let reference = aligner.template().points_for(LandmarkCount::Five, (96, 96));
        let shifted: Vec<Point> = reference.iter().map(|&p| p + Point::new(50.0, 40.0)).collect();
        let lm = Landmarks::new(shifted, LandmarkCount::Five).expect("landmarks");

        let faces = aligner
            .align(&frame, &[lm.clone(), lm], (96, 96))
            .expect("align");
        assert_eq!(faces.len(), 2);
        for face in &faces {
            assert_eq!(face.dimensions(), (96, 96));
            let centre = face.get_pixel(48, 48).0;
            for (got, want) in centre.iter().zip([90u8, 120, 150]) {
                assert!(got.abs_diff(want) <= 1, "centre pixel {centre:?}");
            }
        }
    }

    #[test]
    fn template_file_is_loaded() {
        let mut file = NamedTempFile::new().expect("tempfile");
        let template = AlignTemplate {
            size: [112, 112],
            ..AlignTemplate::builtin()
        };
        file.write_all(serde_json::to_string(&template).unwrap().as_bytes())
            .expect("write");
        let aligner = SimilarityAligner::from_template_path(Some(file.path())).expect("load");
        assert_eq!(aligner.template().size, [112, 112]);

        let none: Option<&Path> = None;
        let builtin = SimilarityAligner::from_template_path(none).expect("builtin");
        assert_eq!(builtin.template(), &AlignTemplate::builtin());
    }
}
