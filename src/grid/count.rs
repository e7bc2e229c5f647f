//! Per-cell obstacle counting.
//!
//! Every point is binned into exactly one cell (or dropped), and points whose
//! normal deviates from vertical by more than the threshold add one to their
//! cell. Large frames are split across rayon workers, each filling a private
//! partial grid; partials are merged by element-wise addition, which makes the
//! result independent of both point order and worker scheduling.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::bounds::{GridBounds, GridDims};
use crate::core::types::{ColoredPoint, Normal, PointCloudFrame};

/// Frames with at least this many points are counted in parallel.
pub const PARALLEL_POINT_THRESHOLD: usize = 16_384;

/// Points per rayon work item in the parallel path.
const PARALLEL_CHUNK: usize = 4_096;

/// Row-major obstacle counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountGrid {
    pub dims: GridDims,
    pub counts: Vec<u32>,
}

impl CountGrid {
    /// All-zero grid of the given size.
    pub fn zeros(dims: GridDims) -> Self {
        Self {
            dims,
            counts: vec![0; dims.cell_count()],
        }
    }

    /// Count at (row, col).
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.counts[self.dims.index(row, col)]
    }

    /// Sum of all cells.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    fn merge(mut self, other: &CountGrid) -> Self {
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a = a.saturating_add(*b);
        }
        self
    }
}

/// Per-cycle counting statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountStats {
    /// Points in the frame
    pub points: usize,
    /// Points counted as obstacle evidence
    pub obstacle_points: usize,
    /// Finite points whose cell index fell outside the grid and was clamped
    pub clamped: usize,
    /// Points with a non-finite X or Y, not binned at all
    pub dropped: usize,
}

impl CountStats {
    /// Points that landed in some cell.
    #[inline]
    pub fn placed(&self) -> usize {
        self.points - self.dropped
    }

    fn merge(self, other: CountStats) -> Self {
        Self {
            points: self.points + other.points,
            obstacle_points: self.obstacle_points + other.obstacle_points,
            clamped: self.clamped + other.clamped,
            dropped: self.dropped + other.dropped,
        }
    }
}

/// Cell placement of one point.
enum Placement {
    Cell { index: usize, clamped: bool },
    Dropped,
}

/// Maps positions to cells for one grid layout.
#[derive(Clone, Copy)]
struct Binner {
    bounds: GridBounds,
    dims: GridDims,
    resolution: f64,
}

impl Binner {
    #[inline]
    fn place(&self, p: &ColoredPoint) -> Placement {
        let (x, y) = (p.x as f64, p.y as f64);
        if !x.is_finite() || !y.is_finite() {
            return Placement::Dropped;
        }
        let (col, col_clamped) = axis_cell(x - self.bounds.x_min, self.resolution, self.dims.width);
        let (row, row_clamped) =
            axis_cell(y - self.bounds.y_min, self.resolution, self.dims.height);
        Placement::Cell {
            index: self.dims.index(row, col),
            clamped: col_clamped || row_clamped,
        }
    }
}

/// Cell index along one axis, clamped into `[0, cells)`.
#[inline]
fn axis_cell(offset: f64, resolution: f64, cells: usize) -> (usize, bool) {
    let raw = (offset / resolution).floor();
    if raw < 0.0 {
        (0, true)
    } else if raw >= cells as f64 {
        (cells - 1, true)
    } else {
        (raw as usize, false)
    }
}

/// True if the normal marks the point as obstacle evidence.
///
/// Undefined normals yield a NaN angle, which never exceeds the threshold.
#[inline]
fn is_obstacle(normal: Option<&Normal>, deviation: f64) -> bool {
    normal.is_some_and(|n| n.deviation_angle() > deviation)
}

/// Accumulate one contiguous run of points into `grid`.
fn count_run(
    points: &[ColoredPoint],
    normals: &[Normal],
    binner: Binner,
    deviation: f64,
    grid: &mut CountGrid,
) -> CountStats {
    let mut stats = CountStats {
        points: points.len(),
        ..Default::default()
    };
    for (i, p) in points.iter().enumerate() {
        match binner.place(p) {
            Placement::Dropped => stats.dropped += 1,
            Placement::Cell { index, clamped } => {
                if clamped {
                    stats.clamped += 1;
                }
                if is_obstacle(normals.get(i), deviation) {
                    grid.counts[index] = grid.counts[index].saturating_add(1);
                    stats.obstacle_points += 1;
                }
            }
        }
    }
    stats
}

/// Bin every point and count obstacle points per cell.
///
/// `normals` is parallel to `frame.points`; a missing entry counts as an
/// undefined normal. Never writes outside the grid: finite points beyond the
/// bounds are clamped to the nearest edge cell, non-finite points are dropped.
/// Both are reported in the returned [`CountStats`] and logged once.
pub fn classify_and_count(
    frame: &PointCloudFrame,
    normals: &[Normal],
    bounds: &GridBounds,
    dims: GridDims,
    cell_resolution: f64,
    deviation: f64,
) -> (CountGrid, CountStats) {
    let (grid, stats) = if frame.len() >= PARALLEL_POINT_THRESHOLD {
        count_parallel(frame, normals, bounds, dims, cell_resolution, deviation)
    } else {
        count_sequential(frame, normals, bounds, dims, cell_resolution, deviation)
    };

    if stats.clamped > 0 || stats.dropped > 0 {
        log::warn!(
            "Grid binning: {} of {} points clamped to edge cells, {} dropped (non-finite)",
            stats.clamped,
            stats.points,
            stats.dropped
        );
    }
    (grid, stats)
}

/// Single-threaded counting path.
pub fn count_sequential(
    frame: &PointCloudFrame,
    normals: &[Normal],
    bounds: &GridBounds,
    dims: GridDims,
    cell_resolution: f64,
    deviation: f64,
) -> (CountGrid, CountStats) {
    let binner = Binner {
        bounds: *bounds,
        dims,
        resolution: cell_resolution,
    };
    let mut grid = CountGrid::zeros(dims);
    let stats = count_run(&frame.points, normals, binner, deviation, &mut grid);
    (grid, stats)
}

/// Rayon counting path: per-chunk partial grids merged by addition.
pub fn count_parallel(
    frame: &PointCloudFrame,
    normals: &[Normal],
    bounds: &GridBounds,
    dims: GridDims,
    cell_resolution: f64,
    deviation: f64,
) -> (CountGrid, CountStats) {
    let binner = Binner {
        bounds: *bounds,
        dims,
        resolution: cell_resolution,
    };

    frame
        .points
        .par_chunks(PARALLEL_CHUNK)
        .enumerate()
        .fold(
            || (CountGrid::zeros(dims), CountStats::default()),
            |(mut grid, stats), (chunk_idx, chunk)| {
                let start = chunk_idx * PARALLEL_CHUNK;
                let chunk_normals = normals.get(start..).unwrap_or(&[]);
                let chunk_stats = count_run(chunk, chunk_normals, binner, deviation, &mut grid);
                (grid, stats.merge(chunk_stats))
            },
        )
        .reduce(
            || (CountGrid::zeros(dims), CountStats::default()),
            |(a_grid, a_stats), (b_grid, b_stats)| (a_grid.merge(&b_grid), a_stats.merge(b_stats)),
        )
}
