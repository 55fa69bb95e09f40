//! Values passed between pipeline stages.

use std::fmt;

use anyhow::Result;
use faceattr_utils::Point;
use image::RgbImage;

/// One detected face in source-image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    /// Confidence in `[0, 1]`.
    pub score: f32,
    pub class_name: String,
}

impl Detection {
    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Intersection over union with another detection.
    pub fn iou(&self, other: &Detection) -> f32 {
        let x1 = self.xmin.max(other.xmin);
        let y1 = self.ymin.max(other.ymin);
        let x2 = self.xmax.min(other.xmax);
        let y2 = self.ymax.min(other.ymax);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if intersection <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 { 0.0 } else { intersection / union }
    }
}

/// Integer box in the framing the landmark model expects.
///
/// May extend outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemappedBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl RemappedBox {
    pub fn width(&self) -> i32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> i32 {
        self.y_max - self.y_min
    }
}

/// Number of keypoints a landmark model produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LandmarkCount {
    /// Both eyes, nose tip, both mouth corners.
    #[default]
    Five,
    /// Both eyes and nose tip.
    Three,
}

impl LandmarkCount {
    pub const fn get(self) -> usize {
        match self {
            LandmarkCount::Five => 5,
            LandmarkCount::Three => 3,
        }
    }
}

impl TryFrom<usize> for LandmarkCount {
    type Error = anyhow::Error;

    fn try_from(value: usize) -> Result<Self> {
        match value {
            5 => Ok(LandmarkCount::Five),
            3 => Ok(LandmarkCount::Three),
            other => anyhow::bail!("unsupported landmark count {other}; expected 5 or 3"),
        }
    }
}

impl fmt::Display for LandmarkCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Exactly [`LandmarkCount`] keypoints for one face.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    points: Vec<Point>,
    count: LandmarkCount,
}

impl Landmarks {
    /// Wrap `points`, rejecting any length other than `count`.
    pub fn new(points: Vec<Point>, count: LandmarkCount) -> Result<Self> {
        anyhow::ensure!(
            points.len() == count.get(),
            "landmark predictor returned {} points, expected {}",
            points.len(),
            count.get()
        );
        Ok(Self { points, count })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn count(&self) -> LandmarkCount {
        self.count
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Canonical-pose face crop produced by alignment.
pub type AlignedFace = RgbImage;

/// Attribute predictions for one aligned face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeResult {
    pub gender: String,
    pub age: String,
    /// Most and second most likely expression.
    pub expression: (String, String),
}
