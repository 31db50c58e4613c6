//! Cell-centre offsets for every detection head.

use serde::{Deserialize, Serialize};

/// One detection head (scale) of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadConfig {
    /// Down-sampling factor between model input pixels and grid cells
    pub stride: u32,
    pub rows: usize,
    pub cols: usize,
}

impl HeadConfig {
    pub fn new(stride: u32, rows: usize, cols: usize) -> Self {
        Self { stride, rows, cols }
    }

    #[inline]
    pub fn cells(&self) -> usize {
        self.rows * self.cols
    }
}

/// Precomputed `(col + 0.5, row + 0.5)` centres, one list per head, in row-major order.
#[derive(Debug, Clone)]
pub struct Grid {
    heads: Vec<HeadConfig>,
    offsets: Vec<Vec<[f32; 2]>>,
}

impl Grid {
    pub fn new(heads: &[HeadConfig]) -> Self {
        let offsets = heads
            .iter()
            .map(|head| {
                (0..head.rows)
                    .flat_map(|row| {
                        (0..head.cols).map(move |col| [col as f32 + 0.5, row as f32 + 0.5])
                    })
                    .collect()
            })
            .collect();
        Self {
            heads: heads.to_vec(),
            offsets,
        }
    }

    pub fn heads(&self) -> &[HeadConfig] {
        &self.heads
    }

    /// Centre of cell `(row, col)` of head `head`, in grid units.
    #[inline]
    pub fn offset(&self, head: usize, row: usize, col: usize) -> [f32; 2] {
        self.offsets[head][row * self.heads[head].cols + col]
    }

    /// Total number of cells over all heads.
    pub fn len(&self) -> usize {
        self.offsets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
