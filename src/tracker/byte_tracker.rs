//! Main BYTETracker algorithm implementation.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::ConfigError;
use crate::geometry::{Corners, Detection, Rect, iou_batch};
use crate::tracker::arena::{TrackArena, TrackKey};
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::{self, AssignmentResult};
use crate::tracker::strack::{IdAllocator, Observation, STrack};
use crate::tracker::track_state::TrackState;

/// Configuration for the BYTETracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detections at or above this score seed tracks and take part in the first association
    pub track_thresh: f32,
    /// Largest association cost (`1 - IoU`, optionally score-fused) accepted as a match
    pub match_thresh: f32,
    /// Frames a lost track is kept at 30 fps before it is removed
    pub track_buffer: u32,
    pub frame_rate: f32,
    /// Multiply IoU by detection score in the high-confidence association cost
    pub fuse_score: bool,
    /// IoU above which a tracked and a lost track are considered the same object
    pub duplicate_iou: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_thresh: 0.5,
            match_thresh: 0.8,
            track_buffer: 30,
            frame_rate: 30.0,
            fuse_score: true,
            duplicate_iou: 0.85,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("track_thresh", self.track_thresh),
            ("match_thresh", self.match_thresh),
            ("duplicate_iou", self.duplicate_iou),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Threshold { name, value });
            }
        }
        if self.frame_rate.is_nan() || self.frame_rate <= 0.0 {
            return Err(ConfigError::Zero("frame_rate"));
        }
        Ok(())
    }

    /// Frames a track may stay lost before removal.
    pub fn max_time_lost(&self) -> u32 {
        (self.frame_rate / 30.0 * self.track_buffer as f32) as u32
    }
}

/// A confirmed track as reported for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackResult {
    pub track_id: u64,
    pub class_id: usize,
    pub score: f32,
    /// Filtered box, TLWH
    pub bbox: Rect,
    /// Outline of the last associated detection
    pub outline: Corners,
}

impl From<&STrack> for TrackResult {
    fn from(track: &STrack) -> Self {
        Self {
            track_id: track.track_id,
            class_id: track.class_id,
            score: track.score,
            bbox: track.tlwh(),
            outline: track.outline,
        }
    }
}

/// ByteTrack multi-object tracker.
///
/// Not meant for concurrent use: `update` mutates the frame counter and all
/// collections, so hosts sharing a tracker across threads must serialize calls.
pub struct BYTETracker {
    tracks: TrackArena,
    tracked_stracks: Vec<TrackKey>,
    lost_stracks: Vec<TrackKey>,
    /// Tracks removed by the most recent update
    removed_stracks: Vec<STrack>,
    frame_id: u32,
    config: TrackerConfig,
    max_time_lost: u32,
    kalman_filter: KalmanFilter,
    ids: IdAllocator,
}

impl BYTETracker {
    pub fn new(config: TrackerConfig) -> Self {
        let max_time_lost = config.max_time_lost();
        Self {
            tracks: TrackArena::new(),
            tracked_stracks: Vec::new(),
            lost_stracks: Vec::new(),
            removed_stracks: Vec::new(),
            frame_id: 0,
            config,
            max_time_lost,
            kalman_filter: KalmanFilter::default(),
            ids: IdAllocator::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    /// Tracks currently followed, including unconfirmed ones.
    pub fn tracked_stracks(&self) -> impl Iterator<Item = &STrack> {
        self.tracks.resolve(&self.tracked_stracks)
    }

    pub fn lost_stracks(&self) -> impl Iterator<Item = &STrack> {
        self.tracks.resolve(&self.lost_stracks)
    }

    /// Tracks removed during the most recent `update`. Replaced on every call.
    pub fn removed_stracks(&self) -> &[STrack] {
        &self.removed_stracks
    }

    /// Drop every track and restart frame and id numbering.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.tracked_stracks.clear();
        self.lost_stracks.clear();
        self.removed_stracks.clear();
        self.frame_id = 0;
        self.ids.reset();
    }

    pub fn update(&mut self, detections: Vec<Detection>) -> Vec<TrackResult> {
        self.frame_id += 1;
        let frame_id = self.frame_id;

        let mut activated_stracks = Vec::new();
        let mut refind_stracks = Vec::new();
        let mut lost_stracks = Vec::new();
        let mut removed_stracks = Vec::new();

        // Step 1: Resolve detections and split into high-score and low-score
        let mut detections_high = Vec::new();
        let mut detections_low = Vec::new();
        for det in &detections {
            match Observation::try_from(det) {
                Ok(obs) if obs.score >= self.config.track_thresh => detections_high.push(obs),
                Ok(obs) => detections_low.push(obs),
                Err(err) => warn!(frame_id, %err, "skipping detection"),
            }
        }

        // Create track pool
        let previous_tracked = std::mem::take(&mut self.tracked_stracks);
        let previous_lost = std::mem::take(&mut self.lost_stracks);
        let (tracked, unconfirmed): (Vec<TrackKey>, Vec<TrackKey>) = previous_tracked
            .into_iter()
            .partition(|&key| self.tracks[key].is_activated);

        let strack_pool: Vec<TrackKey> = tracked.iter().chain(&previous_lost).copied().collect();
        for &key in &strack_pool {
            self.tracks[key].predict(&self.kalman_filter);
        }

        // Step 2: First association, with high score detections
        let mut dists = matching::iou_distance(&self.rects(&strack_pool), &rects(&detections_high));
        if self.config.fuse_score {
            matching::fuse_score(&mut dists, &scores(&detections_high));
        }

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::linear_assignment(&dists, self.config.match_thresh);
        trace!(frame_id, matched = matches.len(), "first association");

        for (itracked, idet) in matches {
            let key = strack_pool[itracked];
            let track = &mut self.tracks[key];
            let det = &detections_high[idet];
            if track.state == TrackState::Tracked {
                track.update(det, &self.kalman_filter, frame_id);
                activated_stracks.push(key);
            } else {
                track.re_activate(det, &self.kalman_filter, frame_id, &mut self.ids, false);
                refind_stracks.push(key);
            }
        }

        // Step 3: Second association, with low score detection boxes.
        // Tracks matched above never reach this stage.
        let r_tracked_stracks: Vec<TrackKey> = unmatched_tracks
            .iter()
            .map(|&i| strack_pool[i])
            .filter(|&key| self.tracks[key].state == TrackState::Tracked)
            .collect();

        let dists_second =
            matching::iou_distance(&self.rects(&r_tracked_stracks), &rects(&detections_low));
        let AssignmentResult {
            matches: matches_second,
            unmatched_tracks: unmatched_tracks_second,
            ..
        } = matching::linear_assignment(&dists_second, self.config.match_thresh);
        trace!(frame_id, matched = matches_second.len(), "second association");

        for (itracked, idet) in matches_second {
            let key = r_tracked_stracks[itracked];
            self.tracks[key].update(&detections_low[idet], &self.kalman_filter, frame_id);
            activated_stracks.push(key);
        }

        for idx in unmatched_tracks_second {
            let key = r_tracked_stracks[idx];
            self.tracks[key].mark_lost();
            lost_stracks.push(key);
        }

        // Deal with unconfirmed tracks, usually tracks with only one beginning frame
        let detections_rem: Vec<Observation> = unmatched_detections
            .iter()
            .map(|&i| detections_high[i])
            .collect();

        let mut dists_unconfirmed =
            matching::iou_distance(&self.rects(&unconfirmed), &rects(&detections_rem));
        if self.config.fuse_score {
            matching::fuse_score(&mut dists_unconfirmed, &scores(&detections_rem));
        }

        let AssignmentResult {
            matches: matches_unconfirmed,
            unmatched_tracks: unmatched_unconfirmed,
            unmatched_detections: unmatched_new,
        } = matching::linear_assignment(&dists_unconfirmed, self.config.match_thresh);

        for (itracked, idet) in matches_unconfirmed {
            let key = unconfirmed[itracked];
            self.tracks[key].update(&detections_rem[idet], &self.kalman_filter, frame_id);
            activated_stracks.push(key);
        }
        for idx in unmatched_unconfirmed {
            let key = unconfirmed[idx];
            self.tracks[key].mark_removed();
            removed_stracks.push(key);
        }

        // Step 4: Init new stracks
        for idx in unmatched_new {
            let mut track = STrack::new(&detections_rem[idx]);
            track.activate(&self.kalman_filter, frame_id, &mut self.ids);
            trace!(frame_id, track_id = track.track_id, "new track");
            activated_stracks.push(self.tracks.insert(track));
        }

        // Step 5: Update state
        for key in previous_lost {
            let track = &mut self.tracks[key];
            if track.state == TrackState::Tracked {
                // refound above
                continue;
            }
            if frame_id.saturating_sub(track.end_frame()) > self.max_time_lost {
                track.mark_removed();
                removed_stracks.push(key);
            } else {
                lost_stracks.push(key);
            }
        }

        let tracked_stracks: Vec<TrackKey> =
            activated_stracks.into_iter().chain(refind_stracks).collect();
        let (tracked_stracks, lost_stracks, duplicates) =
            self.remove_duplicate_stracks(tracked_stracks, lost_stracks);
        for &key in &duplicates {
            self.tracks[key].mark_removed();
        }
        removed_stracks.extend(duplicates);

        self.tracked_stracks = tracked_stracks;
        self.lost_stracks = lost_stracks;
        self.removed_stracks = removed_stracks
            .into_iter()
            .filter_map(|key| self.tracks.remove(key))
            .collect();
        self.debug_check_collections();

        debug!(
            frame_id,
            detections = detections.len(),
            tracked = self.tracked_stracks.len(),
            lost = self.lost_stracks.len(),
            removed = self.removed_stracks.len(),
            "tracker updated"
        );

        self.tracks
            .resolve(&self.tracked_stracks)
            .filter(|t| t.is_activated && t.state == TrackState::Tracked)
            .map(TrackResult::from)
            .collect()
    }

    fn rects(&self, keys: &[TrackKey]) -> Vec<Rect> {
        keys.iter().map(|&key| self.tracks[key].rect()).collect()
    }

    /// Split off tracked/lost pairs that overlap so much they must be the same
    /// object; the one followed for fewer frames is returned as a duplicate.
    fn remove_duplicate_stracks(
        &self,
        stracksa: Vec<TrackKey>,
        stracksb: Vec<TrackKey>,
    ) -> (Vec<TrackKey>, Vec<TrackKey>, Vec<TrackKey>) {
        if stracksa.is_empty() || stracksb.is_empty() {
            return (stracksa, stracksb, Vec::new());
        }

        let ious = iou_batch(&self.rects(&stracksa), &self.rects(&stracksb));

        let mut dupa = vec![false; stracksa.len()];
        let mut dupb = vec![false; stracksb.len()];

        for ((i, j), &iou) in ious.indexed_iter() {
            if iou > self.config.duplicate_iou {
                let a = &self.tracks[stracksa[i]];
                let b = &self.tracks[stracksb[j]];
                let time_a = a.frame_id - a.start_frame;
                let time_b = b.frame_id - b.start_frame;
                if time_a > time_b {
                    dupb[j] = true;
                } else {
                    dupa[i] = true;
                }
            }
        }

        let mut duplicates = Vec::new();
        let mut keep = |keys: Vec<TrackKey>, dup: &[bool]| -> Vec<TrackKey> {
            keys.into_iter()
                .zip(dup)
                .filter_map(|(key, &is_dup)| {
                    if is_dup {
                        duplicates.push(key);
                        None
                    } else {
                        Some(key)
                    }
                })
                .collect()
        };
        let resa = keep(stracksa, &dupa);
        let resb = keep(stracksb, &dupb);

        (resa, resb, duplicates)
    }

    fn debug_check_collections(&self) {
        debug_assert!(
            self.tracked_stracks.iter().all(|key| !self.lost_stracks.contains(key)),
            "track present in both tracked and lost collections"
        );
        debug_assert_eq!(
            self.tracks.len(),
            self.tracked_stracks.len() + self.lost_stracks.len(),
            "track stored outside every collection"
        );
    }
}

fn rects(observations: &[Observation]) -> Vec<Rect> {
    observations.iter().map(|o| o.tlwh).collect()
}

fn scores(observations: &[Observation]) -> Vec<f32> {
    observations.iter().map(|o| o.score).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::OrientedBox;

    fn det(x: f32, y: f32, w: f32, h: f32, score: f32) -> Detection {
        OrientedBox::new(0, score, x + w / 2.0, y + h / 2.0, w, h, 0.0).into()
    }

    #[test]
    fn test_config_validation() {
        assert!(TrackerConfig::default().validate().is_ok());
        let bad = TrackerConfig {
            match_thresh: -0.1,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::Threshold { name: "match_thresh", .. })
        ));
        let bad = TrackerConfig {
            frame_rate: 0.0,
            ..TrackerConfig::default()
        };
        assert_eq!(bad.validate(), Err(ConfigError::Zero("frame_rate")));
    }

    #[test]
    fn test_max_time_lost_scales_with_frame_rate() {
        let config = TrackerConfig {
            frame_rate: 60.0,
            ..TrackerConfig::default()
        };
        assert_eq!(config.max_time_lost(), 60);
        assert_eq!(TrackerConfig::default().max_time_lost(), 30);
    }

    #[test]
    fn test_invalid_detection_is_skipped() {
        let mut tracker = BYTETracker::new(TrackerConfig::default());
        let tracks = tracker.update(vec![
            det(0.0, 0.0, 0.0, 10.0, 0.9),
            det(50.0, 50.0, 20.0, 20.0, 0.9),
        ]);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_id, 1);
    }

    #[test]
    fn test_low_score_detection_does_not_spawn() {
        let mut tracker = BYTETracker::new(TrackerConfig::default());
        let tracks = tracker.update(vec![det(0.0, 0.0, 20.0, 20.0, 0.3)]);
        assert!(tracks.is_empty());
        assert_eq!(tracker.tracked_stracks().count(), 0);
    }

    #[test]
    fn test_unconfirmed_track_gets_one_chance() {
        let mut tracker = BYTETracker::new(TrackerConfig::default());
        tracker.update(vec![]);

        // Born after the first frame: followed but not reported.
        let tracks = tracker.update(vec![det(100.0, 100.0, 40.0, 40.0, 0.9)]);
        assert!(tracks.is_empty());
        assert_eq!(tracker.tracked_stracks().count(), 1);

        // Missing on its second frame: removed outright, never lost.
        let tracks = tracker.update(vec![]);
        assert!(tracks.is_empty());
        assert_eq!(tracker.lost_stracks().count(), 0);
        assert_eq!(tracker.removed_stracks().len(), 1);
        assert_eq!(tracker.removed_stracks()[0].state, TrackState::Removed);
    }

    #[test]
    fn test_unconfirmed_track_confirmed_on_match() {
        let mut tracker = BYTETracker::new(TrackerConfig::default());
        tracker.update(vec![]);
        tracker.update(vec![det(100.0, 100.0, 40.0, 40.0, 0.9)]);

        let tracks = tracker.update(vec![det(101.0, 100.0, 40.0, 40.0, 0.9)]);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_id, 1);
    }

    #[test]
    fn test_removed_is_replaced_each_frame() {
        let mut tracker = BYTETracker::new(TrackerConfig::default());
        tracker.update(vec![]);
        tracker.update(vec![det(100.0, 100.0, 40.0, 40.0, 0.9)]);
        tracker.update(vec![]);
        assert_eq!(tracker.removed_stracks().len(), 1);

        tracker.update(vec![]);
        assert!(tracker.removed_stracks().is_empty());
    }

    #[test]
    fn test_result_carries_class_and_outline() {
        let mut tracker = BYTETracker::new(TrackerConfig::default());
        let obb = OrientedBox::new(4, 0.95, 50.0, 50.0, 40.0, 20.0, 0.3);
        let tracks = tracker.update(vec![obb.into()]);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].class_id, 4);
        assert_eq!(tracks[0].score, 0.95);
        assert_eq!(tracks[0].outline, obb.corners());
    }

    #[test]
    fn test_duplicate_lost_track_is_removed() {
        let mut tracker = BYTETracker::new(TrackerConfig::default());
        tracker.update(vec![det(0.0, 0.0, 40.0, 40.0, 0.9), det(2.0, 0.0, 40.0, 40.0, 0.9)]);

        // Track 2 takes the detection; track 1 goes lost right on top of it.
        let tracks = tracker.update(vec![det(2.0, 0.0, 40.0, 40.0, 0.9)]);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_id, 2);
        assert_eq!(tracker.lost_stracks().count(), 0);

        let removed: Vec<_> = tracker
            .removed_stracks()
            .iter()
            .map(|t| (t.track_id, t.state))
            .collect();
        assert_eq!(removed, vec![(1, TrackState::Removed)]);
    }

    #[test]
    fn test_duplicate_younger_tracked_track_is_removed() {
        let mut tracker = BYTETracker::new(TrackerConfig::default());
        tracker.update(vec![det(0.0, 0.0, 40.0, 40.0, 0.9)]);
        for _ in 0..2 {
            tracker.update(vec![det(0.0, 0.0, 40.0, 40.0, 0.9), det(2.0, 0.0, 40.0, 40.0, 0.9)]);
        }

        // Track 2 wins the only detection, but track 1 has been followed at
        // least as long, so the lost one survives and the tracked one goes.
        let tracks = tracker.update(vec![det(2.0, 0.0, 40.0, 40.0, 0.9)]);
        assert!(tracks.is_empty());

        let lost: Vec<u64> = tracker.lost_stracks().map(|t| t.track_id).collect();
        assert_eq!(lost, vec![1]);
        let removed: Vec<_> = tracker
            .removed_stracks()
            .iter()
            .map(|t| (t.track_id, t.state))
            .collect();
        assert_eq!(removed, vec![(2, TrackState::Removed)]);
        assert_eq!(tracker.tracked_stracks().count(), 0);
    }

    /// Ids reported on the second frame after an object moves right by `dx`.
    fn second_frame_ids(fuse_score: bool, dx: f32) -> Vec<u64> {
        let config = TrackerConfig {
            match_thresh: 0.5,
            fuse_score,
            ..TrackerConfig::default()
        };
        let mut tracker = BYTETracker::new(config);
        tracker.update(vec![det(0.0, 0.0, 40.0, 40.0, 0.6)]);
        tracker
            .update(vec![det(dx, 0.0, 40.0, 40.0, 0.6)])
            .iter()
            .map(|t| t.track_id)
            .collect()
    }

    #[test]
    fn test_unfused_cost_is_plain_iou_distance() {
        // IoU 28/52 = 0.54: cost 0.46 is accepted without fusion
        assert_eq!(second_frame_ids(false, 12.0), vec![1]);
        // IoU 24/56 = 0.43: cost 0.57 is rejected
        assert!(second_frame_ids(false, 16.0).is_empty());
        // Fused with score 0.6 the first shift costs 0.68 and is rejected too
        assert!(second_frame_ids(true, 12.0).is_empty());
    }
}
