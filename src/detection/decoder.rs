//! Decoding of raw oriented-detector head outputs into [`OrientedBox`]es.
//!
//! Every head produces three buffers laid out channel-major over its grid:
//! - box regression: `4 * reg_num` channels, one distribution of `reg_num` bins
//!   per edge distance (left, top, right, bottom)
//! - class logits: `num_classes` channels
//! - angle logit: one channel

use std::f32::consts::PI;

use ndarray::{Array3, ArrayView1, s};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::detection::grid::{Grid, HeadConfig};
use crate::detection::nms::nms_rotated;
use crate::error::{ConfigError, DecodeError};
use crate::geometry::OrientedBox;

/// Model layout and post-processing thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub num_classes: usize,
    /// Bins per edge distance in the distribution-focal regression head
    pub reg_num: usize,
    pub heads: Vec<HeadConfig>,
    /// Cells whose class confidence does not exceed this are dropped
    pub object_thresh: f32,
    /// Probabilistic IoU above which the lower-scoring box is suppressed
    pub nms_thresh: f32,
    pub input_width: u32,
    pub input_height: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            num_classes: 1,
            reg_num: 16,
            heads: vec![
                HeadConfig::new(8, 80, 80),
                HeadConfig::new(16, 40, 40),
                HeadConfig::new(32, 20, 20),
            ],
            object_thresh: 0.45,
            nms_thresh: 0.45,
            input_width: 640,
            input_height: 640,
        }
    }
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heads.is_empty() {
            return Err(ConfigError::NoHeads);
        }
        if self.num_classes == 0 {
            return Err(ConfigError::Zero("num_classes"));
        }
        if self.reg_num == 0 {
            return Err(ConfigError::Zero("reg_num"));
        }
        if self.heads.iter().any(|head| head.stride == 0) {
            return Err(ConfigError::Zero("stride"));
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err(ConfigError::Zero("input size"));
        }
        for (name, value) in [
            ("object_thresh", self.object_thresh),
            ("nms_thresh", self.nms_thresh),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Threshold { name, value });
            }
        }
        Ok(())
    }
}

/// Raw outputs of one detection head, each shaped `(channels, rows, cols)`.
#[derive(Debug, Clone)]
pub struct RawHeadTensor {
    pub reg: Array3<f32>,
    pub cls: Array3<f32>,
    pub ang: Array3<f32>,
}

impl RawHeadTensor {
    pub fn new(reg: Array3<f32>, cls: Array3<f32>, ang: Array3<f32>) -> Self {
        Self { reg, cls, ang }
    }

    /// View flat inference buffers with the channel counts a head is expected to carry.
    pub fn from_flat(
        head: &HeadConfig,
        reg_num: usize,
        num_classes: usize,
        reg: Vec<f32>,
        cls: Vec<f32>,
        ang: Vec<f32>,
    ) -> Result<Self, DecodeError> {
        let shape = |channels| (channels, head.rows, head.cols);
        Ok(Self {
            reg: to_array3("reg", reg, shape(4 * reg_num))?,
            cls: to_array3("cls", cls, shape(num_classes))?,
            ang: to_array3("ang", ang, shape(1))?,
        })
    }
}

fn to_array3(
    buffer: &'static str,
    data: Vec<f32>,
    shape: (usize, usize, usize),
) -> Result<Array3<f32>, DecodeError> {
    let len = data.len();
    Array3::from_shape_vec(shape, data)
        .map_err(|_| DecodeError::BufferLength { buffer, len, shape })
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Softmax over one edge's bins, then the expected bin index.
fn dfl_expectation(logits: ArrayView1<f32>) -> f32 {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    let mut weighted = 0.0;
    for (bin, &logit) in logits.iter().enumerate() {
        let e = (logit - max).exp();
        sum += e;
        weighted += e * bin as f32;
    }
    weighted / sum
}

/// Arg-max over the class logits of one cell, returned with its sigmoid confidence.
fn best_class(cls: &Array3<f32>, row: usize, col: usize) -> (usize, f32) {
    let mut best = (0, cls[[0, row, col]]);
    for class_id in 1..cls.dim().0 {
        let logit = cls[[class_id, row, col]];
        if logit > best.1 {
            best = (class_id, logit);
        }
    }
    (best.0, sigmoid(best.1))
}

/// Turns head tensors into oriented boxes in model-input pixels.
#[derive(Debug, Clone)]
pub struct Decoder {
    config: DecoderConfig,
    grid: Grid,
}

impl Decoder {
    pub fn new(config: DecoderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let grid = Grid::new(&config.heads);
        Ok(Self { config, grid })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Decode every cell above `object_thresh`. The result is unsorted and may be empty.
    pub fn decode(&self, tensors: &[RawHeadTensor]) -> Result<Vec<OrientedBox>, DecodeError> {
        self.check_shapes(tensors)?;

        let mut boxes = Vec::new();
        for (index, (head, tensor)) in self.grid.heads().iter().zip(tensors).enumerate() {
            for row in 0..head.rows {
                for col in 0..head.cols {
                    let (class_id, confidence) = best_class(&tensor.cls, row, col);
                    if confidence.is_nan() || confidence <= self.config.object_thresh {
                        continue;
                    }
                    match self.decode_cell(index, tensor, row, col, class_id, confidence) {
                        Ok(obb) => boxes.push(obb),
                        Err(err) => warn!(head = index, row, col, %err, "dropping candidate"),
                    }
                }
            }
        }
        trace!(candidates = boxes.len(), "decoded head tensors");
        Ok(boxes)
    }

    /// Decode, suppress overlaps, and canonicalize the surviving boxes.
    pub fn postprocess(&self, tensors: &[RawHeadTensor]) -> Result<Vec<OrientedBox>, DecodeError> {
        let candidates = self.decode(tensors)?;
        let total = candidates.len();
        let kept: Vec<OrientedBox> = nms_rotated(candidates, self.config.nms_thresh)
            .into_iter()
            .map(OrientedBox::canonicalize)
            .collect();
        debug!(candidates = total, kept = kept.len(), "postprocessed frame");
        Ok(kept)
    }

    fn decode_cell(
        &self,
        head_index: usize,
        tensor: &RawHeadTensor,
        row: usize,
        col: usize,
        class_id: usize,
        confidence: f32,
    ) -> Result<OrientedBox, DecodeError> {
        let reg_num = self.config.reg_num;
        let mut distances = [0.0f32; 4];
        for (edge, distance) in distances.iter_mut().enumerate() {
            let start = edge * reg_num;
            *distance = dfl_expectation(tensor.reg.slice(s![start..start + reg_num, row, col]));
        }
        let [left, top, right, bottom] = distances;

        let mut angle = (sigmoid(tensor.ang[[0, row, col]]) - 0.25) * PI;
        if !angle.is_finite() {
            warn!(head = head_index, row, col, "non-finite angle, substituting an unrotated box");
            angle = 0.0;
        }

        let (sin, cos) = angle.sin_cos();
        let fx = (right - left) / 2.0;
        let fy = (bottom - top) / 2.0;
        let [gx, gy] = self.grid.offset(head_index, row, col);
        let stride = self.grid.heads()[head_index].stride as f32;

        let cx = (fx * cos - fy * sin + gx) * stride;
        let cy = (fx * sin + fy * cos + gy) * stride;
        let w = (left + right) * stride;
        let h = (top + bottom) * stride;

        if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) {
            return Err(DecodeError::NonFinite { cx, cy, w, h });
        }
        Ok(OrientedBox::new(class_id, confidence, cx, cy, w, h, angle))
    }

    fn check_shapes(&self, tensors: &[RawHeadTensor]) -> Result<(), DecodeError> {
        let heads = self.grid.heads();
        if tensors.len() != heads.len() {
            return Err(DecodeError::HeadCount {
                expected: heads.len(),
                got: tensors.len(),
            });
        }
        for (index, (head, tensor)) in heads.iter().zip(tensors).enumerate() {
            for (buffer, array, channels) in [
                ("reg", &tensor.reg, 4 * self.config.reg_num),
                ("cls", &tensor.cls, self.config.num_classes),
                ("ang", &tensor.ang, 1),
            ] {
                let expected = (channels, head.rows, head.cols);
                if array.dim() != expected {
                    return Err(DecodeError::Shape {
                        head: index,
                        buffer,
                        expected,
                        got: array.dim(),
                    });
                }
            }
        }
        Ok(())
    }
}
