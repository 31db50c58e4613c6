//! Oriented-box detection post-processing and ByteTrack multi-object tracking.
//!
//! Raw head tensors of an oriented detector are decoded with distribution focal
//! regression, filtered with probabilistic-IoU rotated NMS and associated across
//! frames by a two-stage ByteTrack tracker with a Kalman motion model.
//!
//! ```no_run
//! use obb_bytetrack::{BYTETracker, OrientedBox, TrackerConfig};
//!
//! let mut tracker = BYTETracker::new(TrackerConfig::default());
//! let obb = OrientedBox::new(0, 0.9, 120.0, 80.0, 40.0, 20.0, 0.1);
//! for track in tracker.update(vec![obb.into()]) {
//!     println!("{} {:?}", track.track_id, track.bbox);
//! }
//! ```

pub mod config;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod integration;
pub mod tracker;

pub use config::PipelineConfig;
pub use detection::{Decoder, DecoderConfig, RawHeadTensor};
pub use error::{ConfigError, DecodeError};
pub use geometry::{Corners, Detection, OrientedBox, Rect};
pub use integration::{
    DetectionBuilder, InferenceBackend, IntoDetections, PipelineError, TrackedObject,
    TrackerPipeline,
};
pub use tracker::{BYTETracker, STrack, TrackResult, TrackState, TrackerConfig};
