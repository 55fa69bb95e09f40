use std::{cmp::Ordering, path::Path};

use anyhow::{Context, Result};
use faceattr_utils::{
    ChannelOrder,
    config::{AttributeSettings, Normalization, ResizeQuality},
    timing_guard,
};
use image::RgbImage;
use tract_onnx::prelude::Tensor;

use crate::model::{OnnxModel, tensor_values};
use crate::preprocess::{InputSize, face_tensor};
use crate::types::AttributeResult;

/// Classifies gender, age bracket and expression of an aligned face.
pub trait AttributePredictor {
    /// Channel order `predict` expects its input in.
    fn channel_order(&self) -> ChannelOrder;

    /// Classify one aligned face, already converted to [`Self::channel_order`].
    fn predict(&self, face: &RgbImage) -> Result<AttributeResult>;
}

/// Label tables for the three classifier heads.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeLabels {
    pub gender: Vec<String>,
    pub age: Vec<String>,
    pub expression: Vec<String>,
}

impl From<&AttributeSettings> for AttributeLabels {
    fn from(settings: &AttributeSettings) -> Self {
        Self {
            gender: settings.gender_labels.clone(),
            age: settings.age_labels.clone(),
            expression: settings.expression_labels.clone(),
        }
    }
}

/// Multi-head attribute classifier on `tract`.
#[derive(Debug)]
pub struct OnnxAttributePredictor {
    model: OnnxModel,
    labels: AttributeLabels,
    channel_order: ChannelOrder,
    quality: ResizeQuality,
    normalization: Normalization,
}

impl OnnxAttributePredictor {
    pub fn new<P: AsRef<Path>>(model_path: P, settings: &AttributeSettings) -> Result<Self> {
        let labels = AttributeLabels::from(settings);
        anyhow::ensure!(
            !labels.gender.is_empty() && !labels.age.is_empty(),
            "attribute label tables must not be empty"
        );
        anyhow::ensure!(
            labels.expression.len() >= 2,
            "at least two expression labels are required"
        );
        let model = OnnxModel::load(
            model_path,
            "attribute",
            settings.input.width,
            settings.input.height,
        )?;
        Ok(Self {
            model,
            labels,
            channel_order: settings.channel_order,
            quality: settings.input.resize_quality,
            normalization: settings.normalization,
        })
    }
}

impl AttributePredictor for OnnxAttributePredictor {
    fn channel_order(&self) -> ChannelOrder {
        self.channel_order
    }

    fn predict(&self, face: &RgbImage) -> Result<AttributeResult> {
        let _guard = timing_guard("faceattr_core::attribute_inference", log::Level::Trace);
        let (w, h) = self.model.input_size();
        let input = face_tensor(face, InputSize::new(w, h), self.quality, &self.normalization)?;
        let outputs = self.model.run(input)?;
        decode_heads(&outputs, &self.labels)
    }
}

/// Decode classifier outputs into labels.
///
/// Accepts either three tensors (gender, age, expression logits) or a single
/// tensor holding the three heads back to back.
pub fn decode_heads(outputs: &[Tensor], labels: &AttributeLabels) -> Result<AttributeResult> {
    let sizes = [labels.gender.len(), labels.age.len(), labels.expression.len()];
    anyhow::ensure!(
        sizes.iter().all(|&n| n > 0),
        "attribute label tables must not be empty"
    );
    let heads: Vec<&[f32]> = match outputs {
        [gender, age, expression] => vec![
            tensor_values(gender, "gender")?,
            tensor_values(age, "age")?,
            tensor_values(expression, "expression")?,
        ],
        [joined] => {
            let values = tensor_values(joined, "attribute")?;
            anyhow::ensure!(
                values.len() == sizes.iter().sum::<usize>(),
                "attribute output has {} values, expected {} ({} + {} + {})",
                values.len(),
                sizes.iter().sum::<usize>(),
                sizes[0],
                sizes[1],
                sizes[2]
            );
            let (gender, rest) = values.split_at(sizes[0]);
            let (age, expression) = rest.split_at(sizes[1]);
            vec![gender, age, expression]
        }
        other => anyhow::bail!(
            "attribute model returned {} outputs, expected 1 or 3",
            other.len()
        ),
    };

    for ((head, expected), name) in heads.iter().zip(sizes).zip(["gender", "age", "expression"]) {
        anyhow::ensure!(
            head.len() == expected,
            "{name} head has {} scores but {expected} labels are configured",
            head.len()
        );
    }

    let gender = pick(&labels.gender, ranked(heads[0])[0])?;
    let age = pick(&labels.age, ranked(heads[1])[0])?;
    let order = ranked(heads[2]);
    let expression = (
        pick(&labels.expression, order[0])?,
        pick(&labels.expression, *order.get(1).context("expression head needs two scores")?)?,
    );
    Ok(AttributeResult {
        gender,
        age,
        expression,
    })
}

/// Indices sorted by descending score.
fn ranked(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
    order
}

fn pick(labels: &[String], index: usize) -> Result<String> {
    labels
        .get(index)
        .cloned()
        .with_context(|| format!("no label for class index {index}"))
}
