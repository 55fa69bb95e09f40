use std::{fmt::Write, path::Path};

use anyhow::{Context, Result};
use log::{debug, warn};
use tract_onnx::prelude::*;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A loaded ONNX graph ready for CPU execution through `tract`.
///
/// Every model in the pipeline goes through this wrapper; the `label` only
/// decorates log lines and error messages.
#[derive(Debug)]
pub struct OnnxModel {
    runnable: RunnableModel,
    label: String,
    input_shape: [usize; 4],
}

impl OnnxModel {
    /// Load a graph whose single image input is pinned to `[1, 3, height, width]`.
    ///
    /// Optimization is attempted first; graphs that tract cannot optimize fall
    /// back to the decluttered form.
    pub fn load<P: AsRef<Path>>(path: P, label: &str, width: u32, height: u32) -> Result<Self> {
        let path = path.as_ref();
        anyhow::ensure!(
            path.exists(),
            "{label} model file not found: {}",
            path.display()
        );
        anyhow::ensure!(
            width > 0 && height > 0,
            "{label} input dimensions must be greater than zero"
        );
        let input_shape = [1, 3, height as usize, width as usize];

        let runnable = match load_runnable(path, label, input_shape, true) {
            Ok(model) => {
                debug!(
                    "{label} model {} optimized ({}x{})",
                    path.display(),
                    width,
                    height
                );
                model
            }
            Err(opt_err) => {
                let mut chain = String::new();
                for cause in opt_err.chain() {
                    let _ = writeln!(&mut chain, "  - {cause}");
                }
                warn!(
                    "{label} model {} failed optimized load; using decluttered graph.\n{}",
                    path.display(),
                    chain.trim_end()
                );
                load_runnable(path, label, input_shape, false).with_context(|| {
                    format!("{label} model {} could not be loaded", path.display())
                })?
            }
        };

        Ok(Self {
            runnable,
            label: label.to_string(),
            input_shape,
        })
    }

    /// Run the graph on one input tensor and return all outputs in graph order.
    pub fn run(&self, input: Tensor) -> Result<Vec<Tensor>> {
        anyhow::ensure!(
            input.shape() == self.input_shape,
            "{} input shape mismatch: expected {:?}, got {:?}",
            self.label,
            self.input_shape,
            input.shape()
        );
        let outputs = self
            .runnable
            .run(tvec![input.into()])
            .map_err(|e| anyhow::anyhow!("{} execution failed: {e}", self.label))?;
        Ok(outputs.into_iter().map(|v| v.into_tensor()).collect())
    }

    /// Spatial input size as `(width, height)`.
    pub fn input_size(&self) -> (u32, u32) {
        (self.input_shape[3] as u32, self.input_shape[2] as u32)
    }
}

fn load_runnable(
    path: &Path,
    label: &str,
    input_shape: [usize; 4],
    optimized: bool,
) -> Result<RunnableModel> {
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse {label} ONNX graph from {}", path.display()))?
        .with_input_fact(0, f32::fact(input_shape).into())
        .map_err(|e| anyhow::anyhow!("unable to set {label} input shape: {e}"))?;

    if optimized {
        model
            .into_optimized()
            .map_err(|e| anyhow::anyhow!("unable to optimize {label} graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make {label} graph runnable: {e}"))
    } else {
        model
            .into_typed()
            .map_err(|e| anyhow::anyhow!("unable to type-check {label} graph: {e}"))?
            .into_decluttered()
            .map_err(|e| anyhow::anyhow!("unable to declutter {label} graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make {label} graph runnable: {e}"))
    }
}

/// Flatten an output tensor to `f32` values.
pub(crate) fn tensor_values<'a>(tensor: &'a Tensor, what: &str) -> Result<&'a [f32]> {
    tensor
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("{what} output is not f32: {e}"))
}
