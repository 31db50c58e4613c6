//! Error types shared across the decoder, tracker and pipeline.

use thiserror::Error;

/// Errors produced while turning raw head tensors or detections into boxes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("expected {expected} head tensors, got {got}")]
    HeadCount { expected: usize, got: usize },

    #[error("head {head}: {buffer} buffer has shape {got:?}, expected {expected:?}")]
    Shape {
        head: usize,
        buffer: &'static str,
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },

    #[error("{buffer} buffer of {len} values cannot be viewed as {shape:?}")]
    BufferLength {
        buffer: &'static str,
        len: usize,
        shape: (usize, usize, usize),
    },

    #[error("non-finite geometry: cx={cx}, cy={cy}, w={w}, h={h}")]
    NonFinite { cx: f32, cy: f32, w: f32, h: f32 },

    #[error("degenerate box of size {width}x{height}")]
    Degenerate { width: f32, height: f32 },
}

/// Errors produced when validating configuration values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must lie in [0, 1], got {value}")]
    Threshold { name: &'static str, value: f32 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("decoder needs at least one detection head")]
    NoHeads,
}
