//! Trait for object detection inference backends.

use crate::detection::RawHeadTensor;
use crate::geometry::{Detection, OrientedBox};

/// Trait for inference backends running an oriented detector.
///
/// Implement this to connect any runtime (ONNX Runtime, an NPU SDK, ...) to the
/// pipeline. The backend owns preprocessing; it returns the raw outputs of every
/// detection head, in the order of the decoder's head configuration.
///
/// # Example
///
/// ```ignore
/// use obb_bytetrack::{InferenceBackend, RawHeadTensor};
///
/// struct MyRuntime {
///     // Your model here
/// }
///
/// impl InferenceBackend for MyRuntime {
///     type Error = std::io::Error;
///
///     fn infer(
///         &mut self,
///         input: &[u8],
///         width: u32,
///         height: u32,
///     ) -> Result<Vec<RawHeadTensor>, Self::Error> {
///         // Resize, run the model and collect the head outputs
///         Ok(vec![])
///     }
/// }
/// ```
pub trait InferenceBackend {
    /// Error type for inference failures.
    type Error;

    /// Run the model on one image.
    ///
    /// # Arguments
    /// * `input` - Raw image bytes (format depends on implementation)
    /// * `width` - Image width in pixels
    /// * `height` - Image height in pixels
    fn infer(
        &mut self,
        input: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<RawHeadTensor>, Self::Error>;
}

/// Helper trait for converting model-specific outputs to tracker input.
pub trait IntoDetections {
    fn into_detections(self) -> Vec<Detection>;
}

impl IntoDetections for Vec<Detection> {
    fn into_detections(self) -> Vec<Detection> {
        self
    }
}

impl IntoDetections for Vec<OrientedBox> {
    fn into_detections(self) -> Vec<Detection> {
        self.into_iter().map(Detection::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oriented_boxes_into_detections() {
        let boxes = vec![
            OrientedBox::new(0, 0.9, 10.0, 10.0, 4.0, 2.0, 0.0),
            OrientedBox::new(1, 0.6, 30.0, 10.0, 4.0, 2.0, 0.5),
        ];
        let detections = boxes.clone().into_detections();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[1], Detection::CenterForm(boxes[1]));
    }
}
