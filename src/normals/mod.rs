//! Surface normal estimation.
//!
//! The grid pipeline only needs one normal per point; how they are computed
//! is behind [`NormalEstimator`] so a faster or more robust service can be
//! swapped in without touching synthesis.

mod kdtree;

pub use kdtree::KdTreeNormalEstimator;

use crate::core::types::{Normal, PointCloudFrame};

/// Per-point surface normals from radius neighborhoods.
pub trait NormalEstimator: Send + Sync {
    /// Estimate one normal per point of `frame`, in the same order.
    ///
    /// `radius` is the neighborhood radius in meters. Points whose
    /// neighborhood cannot define a plane get [`Normal::UNDEFINED`]. The
    /// returned vector always has `frame.len()` entries.
    fn estimate(&self, frame: &PointCloudFrame, radius: f64) -> Vec<Normal>;
}
