//! Non-maximum suppression for oriented boxes.
//!
//! Overlap is measured with a probabilistic IoU: each box is treated as a 2D
//! Gaussian whose covariance matches a uniform distribution over the rotated
//! rectangle, and `1 - Hellinger distance` between the two Gaussians stands in
//! for the IoU. This only approximates exact polygon IoU, but stays smooth
//! for thin or nearly degenerate boxes.
//!
//! The per-axis variances are `w²/12` and `h²/12`, the second moments of a
//! uniform distribution over each side. Taking the side lengths themselves as
//! variances would make the measure depend on box scale: two 200x200 boxes
//! offset by 50 px would score about 0.11 instead of 0.70 (exact IoU 0.6), so
//! large boxes would almost never suppress each other at the usual thresholds.

use crate::geometry::OrientedBox;

const EPS: f64 = 1e-7;
const MAX_BHATTACHARYYA: f64 = 100.0;

/// Entries `(a, b, c)` of the covariance `[[a, c], [c, b]]` of a rotated box.
fn covariance(obb: &OrientedBox) -> (f64, f64, f64) {
    let var_w = f64::from(obb.w).powi(2) / 12.0;
    let var_h = f64::from(obb.h).powi(2) / 12.0;
    let (sin, cos) = f64::from(obb.angle).sin_cos();
    let (cos2, sin2) = (cos * cos, sin * sin);
    (
        var_w * cos2 + var_h * sin2,
        var_w * sin2 + var_h * cos2,
        (var_w - var_h) * cos * sin,
    )
}

/// Probabilistic IoU between two oriented boxes, in `[0, 1]`.
pub fn probiou(a: &OrientedBox, b: &OrientedBox) -> f32 {
    let (x1, y1) = (f64::from(a.cx), f64::from(a.cy));
    let (x2, y2) = (f64::from(b.cx), f64::from(b.cy));
    let (a1, b1, c1) = covariance(a);
    let (a2, b2, c2) = covariance(b);

    let (sa, sb, sc) = (a1 + a2, b1 + b2, c1 + c2);
    let denom = sa * sb - sc * sc + EPS;

    let t1 = (sa * (y1 - y2).powi(2) + sb * (x1 - x2).powi(2)) / denom * 0.25;
    let t2 = (sc * (x2 - x1) * (y1 - y2)) / denom * 0.5;
    let det1 = (a1 * b1 - c1 * c1).max(0.0);
    let det2 = (a2 * b2 - c2 * c2).max(0.0);
    let t3 = ((sa * sb - sc * sc) / (4.0 * (det1 * det2).sqrt() + EPS) + EPS).ln() * 0.5;

    let mut bd = t1 + t2 + t3;
    // A NaN distance means no usable overlap information.
    if bd.is_nan() {
        bd = MAX_BHATTACHARYYA;
    }
    let bd = bd.clamp(EPS, MAX_BHATTACHARYYA);
    let hd = (1.0 - (-bd).exp() + EPS).sqrt();
    (1.0 - hd).clamp(0.0, 1.0) as f32
}

/// Greedy rotated NMS.
///
/// Boxes are visited by descending score (ties keep their input order); a box
/// survives unless an already kept box overlaps it by more than `iou_threshold`.
/// Class is ignored.
pub fn nms_rotated(mut boxes: Vec<OrientedBox>, iou_threshold: f32) -> Vec<OrientedBox> {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<OrientedBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if kept.iter().all(|k| probiou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
