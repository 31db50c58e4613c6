//! Builder for creating Detection objects from various input formats.

use crate::geometry::{Corners, Detection, OrientedBox};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Center { cx: f32, cy: f32, w: f32, h: f32 },
    Corners(Corners),
}

impl Default for Shape {
    fn default() -> Self {
        Shape::Center {
            cx: 0.0,
            cy: 0.0,
            w: 0.0,
            h: 0.0,
        }
    }
}

/// Builder for creating `Detection` objects from various input formats.
///
/// Axis-aligned inputs become centre-form boxes with the configured angle
/// (0 unless set); `corners` takes precedence and produces a corner-form detection.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    shape: Shape,
    angle: f32,
    score: f32,
    class_id: usize,
}

impl DetectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bounding box in TLBR format (x1, y1, x2, y2).
    pub fn tlbr(self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.xywh((x1 + x2) / 2.0, (y1 + y2) / 2.0, x2 - x1, y2 - y1)
    }

    /// Set bounding box in XYWH format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.shape = Shape::Center { cx, cy, w, h };
        self
    }

    /// Set bounding box in TLWH format (left, top, width, height).
    pub fn tlwh(self, x: f32, y: f32, w: f32, h: f32) -> Self {
        self.xywh(x + w / 2.0, y + h / 2.0, w, h)
    }

    /// Rotation in radians, applied to centre-form boxes.
    pub fn angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn corners(mut self, corners: Corners) -> Self {
        self.shape = Shape::Corners(corners);
        self
    }

    pub fn score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn class_id(mut self, class_id: usize) -> Self {
        self.class_id = class_id;
        self
    }

    pub fn build(self) -> Detection {
        match self.shape {
            Shape::Center { cx, cy, w, h } => {
                OrientedBox::new(self.class_id, self.score, cx, cy, w, h, self.angle).into()
            }
            Shape::Corners(corners) => Detection::Corners {
                class_id: self.class_id,
                score: self.score,
                corners,
            },
        }
    }
}
