//! Integration module for connecting inference backends with the decoder and tracker.
//!
//! This module provides traits and utilities for plugging an inference runtime
//! into the decode, NMS and tracking stages.

mod builder;
mod detector;
mod pipeline;

pub use builder::DetectionBuilder;
pub use detector::{InferenceBackend, IntoDetections};
pub use pipeline::{PipelineError, TrackedObject, TrackerPipeline};
