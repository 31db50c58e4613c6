//! Matching utilities for multi-object tracking.

use ndarray::Array2;
use tracing::warn;

use crate::geometry::{Rect, iou_batch};

/// Cost assigned to padding cells so the solver never prefers them over a real pair.
const PADDING_COST: f64 = 1e6;

/// Compute IoU distance (`1 - IoU`) matrix between tracks and detections.
pub fn iou_distance(track_boxes: &[Rect], det_boxes: &[Rect]) -> Array2<f32> {
    iou_batch(track_boxes, det_boxes).mapv(|iou| 1.0 - iou)
}

/// Blend detection confidence into an IoU distance matrix: `1 - IoU * score`.
pub fn fuse_score(cost_matrix: &mut Array2<f32>, det_scores: &[f32]) {
    for mut row in cost_matrix.rows_mut() {
        for (cost, &score) in row.iter_mut().zip(det_scores) {
            let iou_sim = 1.0 - *cost;
            *cost = 1.0 - iou_sim * score;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Minimum-cost assignment between rows (tracks) and columns (detections).
///
/// Pairs whose cost exceeds `thresh` are reported unmatched on both sides.
/// An empty side skips the solve entirely.
pub fn linear_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: (0..num_cols).collect(),
        };
    }

    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), PADDING_COST);
    padded
        .slice_mut(ndarray::s![..num_rows, ..num_cols])
        .assign(&cost_matrix.mapv(f64::from));

    let mut matches = vec![];
    let mut unmatched_tracks = vec![];
    let mut unmatched_detections_mask = vec![true; num_cols];

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row_idx, &col_idx) in row_to_col.iter().enumerate().take(num_rows) {
                if col_idx < num_cols && cost_matrix[[row_idx, col_idx]] <= thresh {
                    matches.push((row_idx, col_idx));
                    unmatched_detections_mask[col_idx] = false;
                } else {
                    unmatched_tracks.push(row_idx);
                }
            }
        }
        Err(err) => {
            warn!(?err, rows = num_rows, cols = num_cols, "assignment solver failed");
            unmatched_tracks = (0..num_rows).collect();
        }
    }

    let unmatched_detections = unmatched_detections_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &unmatched)| unmatched.then_some(i))
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_iou_distance() {
        let tracks = [Rect::new(0.0, 0.0, 10.0, 10.0)];
        let dets = [Rect::new(0.0, 0.0, 10.0, 10.0), Rect::new(50.0, 50.0, 10.0, 10.0)];
        let dists = iou_distance(&tracks, &dets);
        assert_relative_eq!(dists[[0, 0]], 0.0, epsilon = 1e-6);
        assert_relative_eq!(dists[[0, 1]], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_fuse_score() {
        let mut cost = array![[0.2f32, 1.0]];
        fuse_score(&mut cost, &[0.5, 0.9]);
        assert_relative_eq!(cost[[0, 0]], 0.6, epsilon = 1e-6);
        assert_relative_eq!(cost[[0, 1]], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_optimal_assignment() {
        // Greedy would take (0, 0); the optimum is the anti-diagonal.
        let cost = array![[0.1f32, 0.2], [0.3, 0.9]];
        let result = linear_assignment(&cost, 0.8);
        assert_eq!(result.matches, vec![(0, 1), (1, 0)]);
        assert!(result.unmatched_tracks.is_empty());
        assert!(result.unmatched_detections.is_empty());
    }

    #[test]
    fn test_threshold_rejects_solver_pairs() {
        let cost = array![[0.1f32, 1.0], [1.0, 0.95]];
        let result = linear_assignment(&cost, 0.8);
        assert_eq!(result.matches, vec![(0, 0)]);
        assert_eq!(result.unmatched_tracks, vec![1]);
        assert_eq!(result.unmatched_detections, vec![1]);
    }

    #[test]
    fn test_rectangular_assignment() {
        let cost = array![[0.9f32, 0.1, 0.5]];
        let result = linear_assignment(&cost, 0.8);
        assert_eq!(result.matches, vec![(0, 1)]);
        assert_eq!(result.unmatched_detections, vec![0, 2]);
    }

    #[test]
    fn test_empty_sides_skip_solver() {
        let no_tracks = Array2::<f32>::zeros((0, 3));
        let result = linear_assignment(&no_tracks, 0.8);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_detections, vec![0, 1, 2]);

        let no_dets = Array2::<f32>::zeros((2, 0));
        let result = linear_assignment(&no_dets, 0.8);
        assert_eq!(result.unmatched_tracks, vec![0, 1]);
        assert!(result.unmatched_detections.is_empty());
    }
}
