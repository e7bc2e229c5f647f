//! Grid extents and dimensions.

use serde::{Deserialize, Serialize};

use crate::core::types::PointCloudFrame;
use crate::error::{BhumiError, Result};

/// Largest grid a cycle will allocate (32 Mi cells, about 290 m square at 5 cm).
///
/// One far outlier stretches the bounds, so anything larger is refused
/// instead of allocated.
pub const MAX_GRID_CELLS: usize = 1 << 25;

/// Axis-aligned XY extents of a frame in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GridBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl GridBounds {
    /// Extent along X in meters.
    #[inline]
    pub fn width_m(&self) -> f64 {
        self.x_max - self.x_min
    }

    /// Extent along Y in meters.
    #[inline]
    pub fn height_m(&self) -> f64 {
        self.y_max - self.y_min
    }
}

/// Grid size in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDims {
    /// Cells along X (columns)
    pub width: usize,
    /// Cells along Y (rows)
    pub height: usize,
}

impl GridDims {
    /// Total number of cells, saturating at `usize::MAX`.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.width.saturating_mul(self.height)
    }

    /// Refuse grids above [`MAX_GRID_CELLS`].
    pub fn check_size(&self) -> Result<()> {
        match self.width.checked_mul(self.height) {
            Some(cells) if cells <= MAX_GRID_CELLS => Ok(()),
            _ => Err(BhumiError::GridTooLarge {
                width: self.width,
                height: self.height,
                max_cells: MAX_GRID_CELLS,
            }),
        }
    }

    /// Row-major linear index of (row, col).
    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }
}

/// XY bounds of a frame in one linear scan.
///
/// The accumulators start at 0, not ±infinity, so the bounds always contain
/// the origin: a frame lying entirely at x > 0 still gets `x_min == 0`. The
/// grid origin therefore stays pinned to the sensor origin for clouds that do
/// not straddle it. This is the long-standing behavior of the node and is
/// kept as is; downstream consumers rely on the origin position.
///
/// Points with a non-finite X or Y are skipped.
pub fn compute_bounds(frame: &PointCloudFrame) -> GridBounds {
    let mut bounds = GridBounds::default();
    for p in &frame.points {
        let (x, y) = (p.x as f64, p.y as f64);
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        if x < bounds.x_min {
            bounds.x_min = x;
        }
        if x > bounds.x_max {
            bounds.x_max = x;
        }
        if y < bounds.y_min {
            bounds.y_min = y;
        }
        if y > bounds.y_max {
            bounds.y_max = y;
        }
    }
    bounds
}

/// Grid dimensions covering `bounds` at `cell_resolution` meters per cell.
///
/// `cells = floor(extent / resolution) + 1` per axis, so an empty or
/// single-point frame still gets a 1×1 grid. `cell_resolution` must be
/// positive; callers validate it before a cycle runs. The result is not
/// capped; see [`GridDims::check_size`] before allocating.
pub fn dimension_grid(bounds: &GridBounds, cell_resolution: f64) -> GridDims {
    GridDims {
        width: cells_along(bounds.width_m(), cell_resolution),
        height: cells_along(bounds.height_m(), cell_resolution),
    }
}

#[inline]
fn cells_along(extent: f64, cell_resolution: f64) -> usize {
    // `as usize` saturates: NaN and negatives become 0, huge values usize::MAX
    ((extent / cell_resolution).floor() as usize).saturating_add(1)
}
