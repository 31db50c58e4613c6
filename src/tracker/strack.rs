//! Single object track (STrack) for multi-object tracking.

use crate::error::DecodeError;
use crate::geometry::{Corners, Detection, Rect};
use crate::tracker::kalman_filter::{KalmanFilter, StateCovariance, StateMean};
use crate::tracker::track_state::TrackState;

/// Hands out track ids: strictly increasing, starting at 1.
///
/// Owned by a tracker; every tracker (and every `reset`) starts a fresh sequence.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    last: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// Last id handed out, 0 if none.
    pub fn last_id(&self) -> u64 {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = 0;
    }
}

/// A detection after it has been resolved at the tracker boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub tlwh: Rect,
    pub score: f32,
    pub class_id: usize,
    pub outline: Corners,
}

impl TryFrom<&Detection> for Observation {
    type Error = DecodeError;

    fn try_from(detection: &Detection) -> Result<Self, Self::Error> {
        Ok(Self {
            tlwh: detection.to_rect()?,
            score: detection.score(),
            class_id: detection.class_id(),
            outline: detection.outline(),
        })
    }
}

/// Single object track.
#[derive(Debug, Clone)]
pub struct STrack {
    /// Unique track identifier, 0 until activated
    pub track_id: u64,
    /// Current track state
    pub state: TrackState,
    /// Whether the track has been confirmed
    pub is_activated: bool,
    pub class_id: usize,
    /// Detection confidence score
    pub score: f32,
    /// Frame of the last associated detection
    pub frame_id: u32,
    /// Frame ID when track was started
    pub start_frame: u32,
    /// Observations in the current tracklet
    pub tracklet_len: u32,
    /// Kalman filter state mean (8-dim)
    pub mean: Option<StateMean>,
    /// Kalman filter state covariance (8x8)
    pub covariance: Option<StateCovariance>,
    /// Last associated detection box (TLWH)
    pub tlwh: Rect,
    /// Last associated detection outline
    pub outline: Corners,
}

impl STrack {
    /// Create a new, inactive STrack from a detection.
    pub fn new(observation: &Observation) -> Self {
        Self {
            track_id: 0,
            state: TrackState::New,
            is_activated: false,
            class_id: observation.class_id,
            score: observation.score,
            frame_id: 0,
            start_frame: 0,
            tracklet_len: 0,
            mean: None,
            covariance: None,
            tlwh: observation.tlwh,
            outline: observation.outline,
        }
    }

    /// Get the current bounding box in TLWH format, from the filter when it is running.
    pub fn tlwh(&self) -> Rect {
        match &self.mean {
            Some(mean) => {
                let cx = mean[0] as f32;
                let cy = mean[1] as f32;
                let aspect = mean[2] as f32;
                let h = mean[3] as f32;
                Rect::from_xyah(cx, cy, aspect, h)
            }
            None => self.tlwh,
        }
    }

    pub fn rect(&self) -> Rect {
        self.tlwh()
    }

    pub fn end_frame(&self) -> u32 {
        self.frame_id
    }

    /// Start a new tracklet: assign an id and initialise the filter.
    pub fn activate(&mut self, kalman_filter: &KalmanFilter, frame_id: u32, ids: &mut IdAllocator) {
        self.track_id = ids.next_id();

        let (mean, covariance) = kalman_filter.initiate(self.tlwh.to_xyah_f64());
        self.mean = Some(mean);
        self.covariance = Some(covariance);
        self.tracklet_len = 1;
        self.state = TrackState::Tracked;

        // Only tracks born on the first frame are trusted without a second look.
        if frame_id == 1 {
            self.is_activated = true;
        }

        self.frame_id = frame_id;
        self.start_frame = frame_id;
    }

    /// Resume a lost track with a new detection, keeping its id unless `new_id` is set.
    pub fn re_activate(
        &mut self,
        observation: &Observation,
        kalman_filter: &KalmanFilter,
        frame_id: u32,
        ids: &mut IdAllocator,
        new_id: bool,
    ) {
        self.correct(observation, kalman_filter);

        self.tracklet_len = 1;
        self.state = TrackState::Tracked;
        self.is_activated = true;
        self.frame_id = frame_id;

        if new_id {
            self.track_id = ids.next_id();
        }
    }

    /// Associate a detection with a tracked track.
    pub fn update(
        &mut self,
        observation: &Observation,
        kalman_filter: &KalmanFilter,
        frame_id: u32,
    ) {
        self.frame_id = frame_id;
        self.tracklet_len += 1;
        self.correct(observation, kalman_filter);

        self.state = TrackState::Tracked;
        self.is_activated = true;
    }

    fn correct(&mut self, observation: &Observation, kalman_filter: &KalmanFilter) {
        if let (Some(mean), Some(cov)) = (&self.mean, &self.covariance) {
            let (new_mean, new_cov) =
                kalman_filter.update(mean, cov, observation.tlwh.to_xyah_f64());
            self.mean = Some(new_mean);
            self.covariance = Some(new_cov);
        }
        self.tlwh = observation.tlwh;
        self.outline = observation.outline;
        self.score = observation.score;
        self.class_id = observation.class_id;
    }

    pub fn predict(&mut self, kalman_filter: &KalmanFilter) {
        if let (Some(mean), Some(cov)) = (&self.mean, &self.covariance) {
            let mut mean_to_predict = *mean;
            if self.state != TrackState::Tracked {
                mean_to_predict[7] = 0.0;
            }
            let (new_mean, new_cov) = kalman_filter.predict(&mean_to_predict, cov);
            self.mean = Some(new_mean);
            self.covariance = Some(new_cov);
        }
    }

    pub fn mark_lost(&mut self) {
        self.state = TrackState::Lost;
    }

    pub fn mark_removed(&mut self) {
        self.state = TrackState::Removed;
        self.is_activated = false;
    }
}
