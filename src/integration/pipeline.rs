//! TrackerPipeline for combining inference, decoding and tracking.

use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::PipelineConfig;
use crate::detection::Decoder;
use crate::error::{ConfigError, DecodeError};
use crate::geometry::{Corners, Detection};
use crate::tracker::{BYTETracker, TrackResult};

use super::{InferenceBackend, IntoDetections};

/// Failure of one `process_frame` call.
#[derive(Debug, Error)]
pub enum PipelineError<E> {
    #[error("inference failed")]
    Inference(#[source] E),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// One object reported for a frame, in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedObject {
    /// `None` while tracking is disabled
    pub track_id: Option<u64>,
    pub class_id: usize,
    pub score: f32,
    pub outline: Corners,
}

impl From<TrackResult> for TrackedObject {
    fn from(track: TrackResult) -> Self {
        Self {
            track_id: Some(track.track_id),
            class_id: track.class_id,
            score: track.score,
            outline: track.outline,
        }
    }
}

impl From<&Detection> for TrackedObject {
    fn from(detection: &Detection) -> Self {
        Self {
            track_id: None,
            class_id: detection.class_id(),
            score: detection.score(),
            outline: detection.outline(),
        }
    }
}

/// End-to-end pipeline: any `InferenceBackend`, the oriented-box decoder and
/// the `BYTETracker`.
pub struct TrackerPipeline<B: InferenceBackend> {
    backend: B,
    decoder: Decoder,
    tracker: BYTETracker,
    with_tracking: bool,
}

impl<B: InferenceBackend> TrackerPipeline<B> {
    pub fn new(backend: B, config: PipelineConfig) -> Result<Self, ConfigError> {
        config.tracker.validate()?;
        Ok(Self {
            backend,
            decoder: Decoder::new(config.decoder)?,
            tracker: BYTETracker::new(config.tracker),
            with_tracking: config.with_tracking,
        })
    }

    pub fn with_default_config(backend: B) -> Result<Self, ConfigError> {
        Self::new(backend, PipelineConfig::default())
    }

    /// Run inference on one image and report the objects found in it.
    ///
    /// Boxes are decoded in model-input pixels and scaled to `width` x `height`
    /// before tracking. The tracker advances one frame per call, also when
    /// nothing was detected.
    #[instrument(level = "debug", skip(self, input))]
    pub fn process_frame(
        &mut self,
        input: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<TrackedObject>, PipelineError<B::Error>> {
        let tensors = self
            .backend
            .infer(input, width, height)
            .map_err(PipelineError::Inference)?;
        let boxes = self.decoder.postprocess(&tensors)?;

        let config = self.decoder.config();
        let sx = width as f32 / config.input_width as f32;
        let sy = height as f32 / config.input_height as f32;
        let detections: Vec<Detection> = boxes
            .iter()
            .map(|obb| Detection::Corners {
                class_id: obb.class_id,
                score: obb.score,
                corners: obb.corners().scaled(sx, sy),
            })
            .collect();

        Ok(self.process_detections(detections))
    }

    /// Feed already decoded detections, skipping inference and decoding.
    pub fn process_detections(&mut self, detections: impl IntoDetections) -> Vec<TrackedObject> {
        let detections = detections.into_detections();
        if !self.with_tracking {
            return detections.iter().map(TrackedObject::from).collect();
        }

        let objects: Vec<TrackedObject> = self
            .tracker
            .update(detections)
            .into_iter()
            .map(TrackedObject::from)
            .collect();
        debug!(frame_id = self.tracker.frame_id(), tracks = objects.len(), "frame tracked");
        objects
    }

    /// Turn association across frames on or off. Enabling always starts
    /// from a fresh tracker.
    pub fn set_tracking(&mut self, enable: bool) {
        if enable {
            self.tracker.reset();
        }
        self.with_tracking = enable;
    }

    pub fn is_tracking(&self) -> bool {
        self.with_tracking
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn tracker(&self) -> &BYTETracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut BYTETracker {
        &mut self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::RawHeadTensor;
    use crate::geometry::OrientedBox;

    #[derive(Debug, Error)]
    #[error("device lost")]
    struct DeviceLost;

    /// Backend that fails or returns no head outputs at all.
    struct FailingBackend {
        fail: bool,
    }

    impl InferenceBackend for FailingBackend {
        type Error = DeviceLost;

        fn infer(
            &mut self,
            _input: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<RawHeadTensor>, Self::Error> {
            if self.fail {
                Err(DeviceLost)
            } else {
                Ok(vec![])
            }
        }
    }

    fn pipeline(fail: bool) -> TrackerPipeline<FailingBackend> {
        TrackerPipeline::with_default_config(FailingBackend { fail }).unwrap()
    }

    #[test]
    fn test_inference_error_is_wrapped() {
        let mut pipeline = pipeline(true);
        let err = pipeline.process_frame(&[], 640, 480).unwrap_err();
        assert!(matches!(err, PipelineError::Inference(DeviceLost)));
        assert_eq!(pipeline.tracker().frame_id(), 0);
    }

    #[test]
    fn test_missing_heads_is_a_decode_error() {
        let mut pipeline = pipeline(false);
        let err = pipeline.process_frame(&[], 640, 480).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Decode(DecodeError::HeadCount { expected: 3, got: 0 })
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.tracker.match_thresh = 2.0;
        assert!(TrackerPipeline::new(FailingBackend { fail: false }, config).is_err());
    }

    #[test]
    fn test_detections_without_tracking() {
        let mut pipeline = pipeline(false);
        pipeline.set_tracking(false);
        let obb = OrientedBox::new(2, 0.8, 50.0, 50.0, 20.0, 10.0, 0.0);
        let objects = pipeline.process_detections(vec![obb]);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].track_id, None);
        assert_eq!(objects[0].class_id, 2);
        assert_eq!(pipeline.tracker().frame_id(), 0);
    }

    #[test]
    fn test_enabling_tracking_resets_tracker() {
        let mut pipeline = pipeline(false);
        let obb = OrientedBox::new(0, 0.9, 50.0, 50.0, 20.0, 10.0, 0.0);
        let objects = pipeline.process_detections(vec![obb]);
        assert_eq!(objects[0].track_id, Some(1));
        pipeline.process_detections(vec![OrientedBox::new(0, 0.9, 200.0, 200.0, 20.0, 10.0, 0.0)]);
        assert_eq!(pipeline.tracker().frame_id(), 2);

        pipeline.set_tracking(true);
        assert_eq!(pipeline.tracker().frame_id(), 0);
        let objects = pipeline.process_detections(vec![obb]);
        assert_eq!(objects[0].track_id, Some(1));
    }
}
