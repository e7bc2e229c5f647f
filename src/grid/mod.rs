//! Grid synthesis.
//!
//! A cycle turns one frame plus its normals into a published grid:
//!
//! ```text
//! frame ──► compute_bounds ──► dimension_grid ──► classify_and_count ──► threshold ──► assemble
//!  normals ─────────────────────────────────────────┘
//! ```

pub mod bounds;
pub mod count;
pub mod message;
pub mod occupancy;
pub mod synthesizer;

pub use bounds::{GridBounds, GridDims, MAX_GRID_CELLS, compute_bounds, dimension_grid};
pub use count::{CountGrid, CountStats, PARALLEL_POINT_THRESHOLD, classify_and_count};
pub use message::{GridMessage, MapMetaData, Time, assemble};
pub use occupancy::{CellValue, OccupancyGrid, ZeroCountPolicy, threshold};
pub use synthesizer::{CycleReport, GridSynthesizer, SynthesisOutput};
