//! ByteTrack multi-object tracking over axis-aligned boxes.

mod arena;
mod byte_tracker;
mod kalman_filter;
mod matching;
mod strack;
mod track_state;

pub use arena::{TrackArena, TrackKey};
pub use byte_tracker::{BYTETracker, TrackResult, TrackerConfig};
pub use kalman_filter::{KalmanFilter, StateCovariance, StateMean};
pub use matching::{AssignmentResult, fuse_score, iou_distance, linear_assignment};
pub use strack::{IdAllocator, Observation, STrack};
pub use track_state::TrackState;
