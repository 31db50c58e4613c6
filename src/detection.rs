//! Oriented-detector post-processing: grid offsets, head decoding and rotated NMS.

mod decoder;
mod grid;
mod nms;

pub use decoder::{Decoder, DecoderConfig, RawHeadTensor};
pub use grid::{Grid, HeadConfig};
pub use nms::{nms_rotated, probiou};
