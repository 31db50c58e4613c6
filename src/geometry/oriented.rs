//! Oriented boxes, their corner form, and the detection type the tracker accepts.

use std::f32::consts::{FRAC_PI_2, PI};

use tracing::warn;

use crate::error::DecodeError;
use crate::geometry::Rect;

/// Detection box with a rotation angle, in centre/size/angle form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub class_id: usize,
    /// Confidence in `[0, 1]`
    pub score: f32,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    /// Rotation in radians
    pub angle: f32,
}

impl OrientedBox {
    pub fn new(class_id: usize, score: f32, cx: f32, cy: f32, w: f32, h: f32, angle: f32) -> Self {
        Self {
            class_id,
            score,
            cx,
            cy,
            w,
            h,
            angle,
        }
    }

    /// Rewrite the box so the long side is the width and the angle lies in `[0, π)`.
    pub fn canonicalize(self) -> Self {
        let (w, h, angle) = if self.w > self.h {
            (self.w, self.h, self.angle.rem_euclid(PI))
        } else {
            (self.h, self.w, (self.angle + FRAC_PI_2).rem_euclid(PI))
        };
        Self { w, h, angle, ..self }
    }

    /// Four corners of the box. Falls back to the un-rotated box when the
    /// rotation produces non-finite coordinates.
    pub fn corners(&self) -> Corners {
        let (sin, cos) = self.angle.sin_cos();
        let (w2, h2) = (self.w / 2.0, self.h / 2.0);
        let (cx, cy) = (self.cx, self.cy);

        let corners = Corners {
            points: [
                [cx - w2 * cos + h2 * sin, cy - w2 * sin - h2 * cos],
                [cx + w2 * cos + h2 * sin, cy + w2 * sin - h2 * cos],
                [cx + w2 * cos - h2 * sin, cy + w2 * sin + h2 * cos],
                [cx - w2 * cos - h2 * sin, cy - w2 * sin + h2 * cos],
            ],
        };
        if corners.is_finite() {
            return corners;
        }

        warn!(
            cx,
            cy,
            w = self.w,
            h = self.h,
            angle = self.angle,
            "non-finite rotated corners, falling back to an axis-aligned box"
        );
        Corners::from_rect(&Rect::new(cx - w2, cy - h2, self.w, self.h))
    }
}

/// Corner form of an oriented box, clockwise from the top-left of the un-rotated box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Corners {
    pub points: [[f32; 2]; 4],
}

impl Corners {
    pub fn new(points: [[f32; 2]; 4]) -> Self {
        Self { points }
    }

    /// Corners of an axis-aligned rectangle.
    pub fn from_rect(rect: &Rect) -> Self {
        let [x1, y1, x2, y2] = rect.to_tlbr();
        Self {
            points: [[x1, y1], [x2, y1], [x2, y2], [x1, y2]],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.points.iter().flatten().all(|v| v.is_finite())
    }

    /// Scale every point independently along x and y, e.g. from model input
    /// resolution back to the source image.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            points: self.points.map(|[x, y]| [x * sx, y * sy]),
        }
    }

    /// Mean of the four points.
    pub fn center(&self) -> (f32, f32) {
        let (sx, sy) = self
            .points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), [x, y]| (sx + x, sy + y));
        (sx / 4.0, sy / 4.0)
    }

    /// Smallest axis-aligned rectangle containing all four points.
    pub fn bounding_rect(&self) -> Rect {
        let mut min = [f32::INFINITY; 2];
        let mut max = [f32::NEG_INFINITY; 2];
        for point in &self.points {
            for axis in 0..2 {
                min[axis] = min[axis].min(point[axis]);
                max[axis] = max[axis].max(point[axis]);
            }
        }
        Rect::from_tlbr(min[0], min[1], max[0], max[1])
    }
}

/// Detection input for the tracker.
///
/// Detectors report boxes either as four corners or in centre/size/angle form;
/// both are resolved to an axis-aligned [`Rect`] once, when they enter the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Detection {
    Corners {
        class_id: usize,
        score: f32,
        corners: Corners,
    },
    CenterForm(OrientedBox),
}

impl Detection {
    pub fn score(&self) -> f32 {
        match self {
            Detection::Corners { score, .. } => *score,
            Detection::CenterForm(obb) => obb.score,
        }
    }

    pub fn class_id(&self) -> usize {
        match self {
            Detection::Corners { class_id, .. } => *class_id,
            Detection::CenterForm(obb) => obb.class_id,
        }
    }

    /// Outline of the detection in corner form.
    pub fn outline(&self) -> Corners {
        match self {
            Detection::Corners { corners, .. } => *corners,
            Detection::CenterForm(obb) => obb.corners(),
        }
    }

    /// Axis-aligned rectangle enclosing the detection.
    pub fn to_rect(&self) -> Result<Rect, DecodeError> {
        let outline = self.outline();
        let rect = outline.bounding_rect();
        if !outline.is_finite() || !rect.is_finite() {
            return Err(DecodeError::NonFinite {
                cx: rect.x + rect.width / 2.0,
                cy: rect.y + rect.height / 2.0,
                w: rect.width,
                h: rect.height,
            });
        }
        if rect.width <= 0.0 || rect.height <= 0.0 {
            return Err(DecodeError::Degenerate {
                width: rect.width,
                height: rect.height,
            });
        }
        Ok(rect)
    }
}

impl From<OrientedBox> for Detection {
    fn from(obb: OrientedBox) -> Self {
        Detection::CenterForm(obb)
    }
}
