//! Box formats and overlap measures shared by the decoder and the tracker.

mod oriented;
mod rect;

pub use oriented::{Corners, Detection, OrientedBox};
pub use rect::{Rect, iou_batch};
