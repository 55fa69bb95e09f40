//! Decoding of YuNet detector outputs into [`Detection`]s.
//!
//! YuNet either emits one fused `[N, 15]` tensor or twelve raw head tensors
//! (`cls`, `obj`, `bbox`, `kps` for strides 8, 16 and 32). Both forms end up
//! as rows of `[x, y, w, h, 10 keypoint coords, score]` in model space. The
//! keypoints are ignored here; the landmark stage predicts its own.

use std::cmp::Ordering;

use anyhow::Result;
use faceattr_utils::config::DetectionSettings;
use tract_onnx::prelude::Tensor;

use crate::model::tensor_values;
use crate::preprocess::InputSize;
use crate::types::Detection;

const STRIDES: [usize; 3] = [8, 16, 32];
/// Coarsest feature stride; detector inputs must be a multiple of it.
pub const MAX_STRIDE: u32 = 32;
const HEADS: usize = 4;
const ROW_LEN: usize = 15;
const SCORE_COL: usize = 14;

/// Label attached to every detector output.
pub const FACE_CLASS: &str = "face";

/// Candidate filtering applied while decoding.
#[derive(Debug, Clone)]
pub struct PostprocessConfig {
    /// Candidates scoring below this are dropped.
    pub score_floor: f32,
    /// IoU above which the lower-scoring of two candidates is suppressed.
    pub nms_threshold: f32,
    /// Cap on candidates kept before suppression; 0 disables the cap.
    pub top_k: usize,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            score_floor: 0.5,
            nms_threshold: 0.3,
            top_k: 5_000,
        }
    }
}

impl From<&DetectionSettings> for PostprocessConfig {
    fn from(settings: &DetectionSettings) -> Self {
        PostprocessConfig {
            score_floor: settings.model_score_floor,
            nms_threshold: settings.nms_threshold,
            top_k: settings.top_k,
        }
    }
}

/// Turn raw model outputs into fused `[x, y, w, h, kps.., score]` rows.
pub fn fuse_outputs(outputs: &[Tensor], input_size: InputSize) -> Result<Vec<[f32; ROW_LEN]>> {
    match outputs.len() {
        0 => anyhow::bail!("detector produced no outputs"),
        1 => fused_rows(&outputs[0]),
        n if n == STRIDES.len() * HEADS => decode_heads(outputs, input_size),
        other => anyhow::bail!(
            "unexpected number of detector outputs: expected 1 or {}, got {}",
            STRIDES.len() * HEADS,
            other
        ),
    }
}

fn fused_rows(output: &Tensor) -> Result<Vec<[f32; ROW_LEN]>> {
    match output.shape() {
        [_, ROW_LEN] | [1, _, ROW_LEN] => {}
        other => anyhow::bail!(
            "detector output must have shape [N, 15] or [1, N, 15] (got {:?})",
            other
        ),
    }
    let values = tensor_values(output, "detector")?;
    Ok(values
        .chunks_exact(ROW_LEN)
        .map(|chunk| {
            let mut row = [0f32; ROW_LEN];
            row.copy_from_slice(chunk);
            row
        })
        .collect())
}

fn decode_heads(outputs: &[Tensor], input_size: InputSize) -> Result<Vec<[f32; ROW_LEN]>> {
    let pad_w = (input_size.width as usize).div_ceil(MAX_STRIDE as usize) * MAX_STRIDE as usize;
    let pad_h = (input_size.height as usize).div_ceil(MAX_STRIDE as usize) * MAX_STRIDE as usize;
    let mut rows = Vec::new();

    for (level, &stride) in STRIDES.iter().enumerate() {
        let cols = pad_w / stride;
        let cells = cols * (pad_h / stride);
        let head = |kind: usize| &outputs[level + STRIDES.len() * kind];
        let cls = head_values(head(0), "cls", stride, cells)?;
        let obj = head_values(head(1), "obj", stride, cells)?;
        let bbox = head_values(head(2), "bbox", stride, cells * 4)?;
        let kps = head_values(head(3), "kps", stride, cells * 10)?;
        let s = stride as f32;

        for idx in 0..cells {
            let (col, row) = ((idx % cols) as f32, (idx / cols) as f32);
            let score = (cls[idx].clamp(0.0, 1.0) * obj[idx].clamp(0.0, 1.0)).sqrt();

            let b = &bbox[idx * 4..idx * 4 + 4];
            let w = b[2].exp() * s;
            let h = b[3].exp() * s;
            let cx = (col + b[0]) * s;
            let cy = (row + b[1]) * s;

            let mut out = [0f32; ROW_LEN];
            out[..4].copy_from_slice(&[cx - w / 2.0, cy - h / 2.0, w, h]);
            for lm in 0..5 {
                out[4 + lm * 2] = (kps[idx * 10 + lm * 2] + col) * s;
                out[5 + lm * 2] = (kps[idx * 10 + lm * 2 + 1] + row) * s;
            }
            out[SCORE_COL] = if score.is_finite() { score } else { 0.0 };
            rows.push(out);
        }
    }
    Ok(rows)
}

fn head_values<'a>(tensor: &'a Tensor, name: &str, stride: usize, expected: usize) -> Result<&'a [f32]> {
    let values = tensor_values(tensor, name)?;
    anyhow::ensure!(
        values.len() == expected,
        "{name} length mismatch at stride {stride}: expected {expected}, got {}",
        values.len()
    );
    Ok(values)
}

/// Scale fused rows to image space, filter them and apply NMS.
///
/// The result is sorted by descending score.
pub fn rows_to_detections(
    rows: &[[f32; ROW_LEN]],
    scale_x: f32,
    scale_y: f32,
    config: &PostprocessConfig,
) -> Vec<Detection> {
    let mut detections: Vec<Detection> = rows
        .iter()
        .filter(|row| row[SCORE_COL].is_finite() && row[SCORE_COL] >= config.score_floor)
        .filter(|row| row[2] > 0.0 && row[3] > 0.0)
        .map(|row| {
            let xmin = row[0] * scale_x;
            let ymin = row[1] * scale_y;
            Detection {
                xmin,
                ymin,
                xmax: xmin + row[2] * scale_x,
                ymax: ymin + row[3] * scale_y,
                score: row[SCORE_COL],
                class_name: FACE_CLASS.to_string(),
            }
        })
        .collect();

    detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    if config.top_k > 0 {
        detections.truncate(config.top_k);
    }
    if config.nms_threshold > 0.0 && detections.len() > 1 {
        detections = non_max_suppression(detections, config.nms_threshold);
    }
    detections
}

fn non_max_suppression(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        if kept.iter().all(|k| candidate.iou(k) <= threshold) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(x: f32, y: f32, w: f32, h: f32, score: f32) -> [f32; ROW_LEN] {
        let mut r = [0f32; ROW_LEN];
        r[..4].copy_from_slice(&[x, y, w, h]);
        r[SCORE_COL] = score;
        r
    }

    #[test]
    fn filters_by_floor_and_scales_coordinates() {
        let rows = [row(10.0, 20.0, 30.0, 40.0, 0.95), row(5.0, 5.0, 10.0, 10.0, 0.2)];
        let config = PostprocessConfig {
            score_floor: 0.3,
            ..Default::default()
        };
        let detections = rows_to_detections(&rows, 2.0, 0.5, &config);
        assert_eq!(detections.len(), 1);
        let det = &detections[0];
        assert_eq!(det.class_name, FACE_CLASS);
        assert!((det.xmin - 20.0).abs() < f32::EPSILON);
        assert!((det.ymin - 10.0).abs() < f32::EPSILON);
        assert!((det.xmax - 80.0).abs() < f32::EPSILON);
        assert!((det.ymax - 30.0).abs() < f32::EPSILON);
    }

    #[test]
    fn suppresses_overlapping_candidates() {
        let rows = [row(0.0, 0.0, 10.0, 10.0, 0.9), row(1.0, 1.0, 10.0, 10.0, 0.99)];
        let detections = rows_to_detections(&rows, 1.0, 1.0, &PostprocessConfig::default());
        assert_eq!(detections.len(), 1);
        assert!((detections[0].score - 0.99).abs() < f32::EPSILON);
    }

    #[test]
    fn fused_tensor_shapes_are_accepted() {
        let flat: Vec<f32> = row(0.0, 0.0, 1.0, 1.0, 0.9).to_vec();
        let batched = Tensor::from_shape(&[1, 1, ROW_LEN], &flat).unwrap();
        let rows = fuse_outputs(&[batched], InputSize::default()).expect("fused");
        assert_eq!(rows.len(), 1);

        let bad = Tensor::from_shape(&[1, 14], &flat[..14]).unwrap();
        assert!(fuse_outputs(&[bad], InputSize::default()).is_err());
    }

    #[test]
    fn decodes_multi_stride_heads() {
        let size = InputSize::new(32, 32);
        let mut cls = Vec::new();
        let mut obj = Vec::new();
        let mut bbox = Vec::new();
        let mut kps = Vec::new();
        for &stride in STRIDES.iter() {
            let cells = (32 / stride) * (32 / stride);
            cls.push(Tensor::from_shape(&[cells], &vec![1.0f32; cells]).unwrap());
            obj.push(Tensor::from_shape(&[cells], &vec![0.25f32; cells]).unwrap());
            bbox.push(Tensor::from_shape(&[cells, 4], &vec![0.0f32; cells * 4]).unwrap());
            kps.push(Tensor::from_shape(&[cells, 10], &vec![0.0f32; cells * 10]).unwrap());
        }
        let outputs: Vec<Tensor> = cls.into_iter().chain(obj).chain(bbox).chain(kps).collect();

        let rows = fuse_outputs(&outputs, size).expect("decode");
        assert_eq!(rows.len(), 16 + 4 + 1);
        // First stride-8 cell: centre (0,0), size 8x8, score sqrt(0.25).
        assert_eq!(&rows[0][..4], &[-4.0, -4.0, 8.0, 8.0]);
        assert!((rows[0][SCORE_COL] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn settings_map_to_config() {
        let settings = DetectionSettings {
            model_score_floor: 0.7,
            nms_threshold: 0.25,
            top_k: 12,
            score_threshold: 0.1,
            ..Default::default()
        };
        let config = PostprocessConfig::from(&settings);
        assert_eq!(config.score_floor, 0.7);
        assert_eq!(config.nms_threshold, 0.25);
        assert_eq!(config.top_k, 12);
    }
}
