//! One synthesis cycle: bounds, dimensions, normals, counts, threshold, message.

use std::time::Instant;

use super::bounds::{compute_bounds, dimension_grid};
use super::count::{CountStats, classify_and_count};
use super::message::{GridMessage, Time, assemble};
use super::occupancy::threshold;
use crate::error::Result;
use crate::normals::{KdTreeNormalEstimator, NormalEstimator};
use crate::state::Snapshot;

/// Diagnostics for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub seq: u64,
    pub points: usize,
    pub width: usize,
    pub height: usize,
    pub occupied_cells: usize,
    pub stats: CountStats,
    /// Normal estimation time in milliseconds
    pub normals_ms: f64,
    /// Bounds through message assembly, in milliseconds
    pub grid_ms: f64,
    /// Time between frame arrival and cycle start, if known
    pub frame_age_ms: Option<f64>,
}

/// Result of [`GridSynthesizer::synthesize`].
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    pub message: GridMessage,
    pub report: CycleReport,
}

/// Stateless grid pipeline around a normal estimator.
///
/// Nothing carries over between cycles; each call recomputes from the
/// snapshot alone.
pub struct GridSynthesizer {
    estimator: Box<dyn NormalEstimator>,
}

impl GridSynthesizer {
    pub fn new(estimator: Box<dyn NormalEstimator>) -> Self {
        Self { estimator }
    }

    /// Run one cycle on `snapshot`.
    ///
    /// Fails with [`BhumiError::GridTooLarge`](crate::error::BhumiError::GridTooLarge)
    /// before any allocation or normal estimation when the frame's bounds
    /// need more than [`MAX_GRID_CELLS`](super::MAX_GRID_CELLS) cells.
    pub fn synthesize(
        &self,
        snapshot: &Snapshot,
        seq: u64,
        stamp: Time,
    ) -> Result<SynthesisOutput> {
        let started = Instant::now();
        let frame_age_ms = snapshot
            .received_at
            .map(|t| started.saturating_duration_since(t).as_secs_f64() * 1000.0);
        let params = &snapshot.params;
        let frame = snapshot.frame.as_ref();

        let bounds = compute_bounds(frame);
        let dims = dimension_grid(&bounds, params.cell_resolution);
        dims.check_size()?;

        let normals_started = Instant::now();
        let normals = self.estimator.estimate(frame, params.search_radius);
        let normals_ms = normals_started.elapsed().as_secs_f64() * 1000.0;

        let (counts, stats) = classify_and_count(
            frame,
            &normals,
            &bounds,
            dims,
            params.cell_resolution,
            params.deviation,
        );
        let occupancy = threshold(&counts, params.buffer, params.zero_count_policy);
        let message = assemble(
            &occupancy,
            dims,
            &bounds,
            params.cell_resolution,
            seq,
            stamp,
            &params.frame_id,
        );

        let report = CycleReport {
            seq,
            points: frame.len(),
            width: dims.width,
            height: dims.height,
            occupied_cells: occupancy.occupied_count(),
            stats,
            normals_ms,
            grid_ms: (started.elapsed().as_secs_f64() * 1000.0 - normals_ms).max(0.0),
            frame_age_ms,
        };
        log::debug!(
            "Cycle {}: {} points -> {}x{} grid, {} occupied (normals {:.1}ms, grid {:.1}ms)",
            report.seq,
            report.points,
            report.width,
            report.height,
            report.occupied_cells,
            report.normals_ms,
            report.grid_ms
        );

        Ok(SynthesisOutput { message, report })
    }
}

impl Default for GridSynthesizer {
    fn default() -> Self {
        Self::new(Box::new(KdTreeNormalEstimator::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridParams;
    use crate::core::types::{ColoredPoint, Normal, PointCloudFrame};
    use crate::error::BhumiError;
    use crate::grid::occupancy::ZeroCountPolicy;
    use std::sync::Arc;

    /// Returns the same normal for every point.
    struct FixedNormals(Normal);

    impl NormalEstimator for FixedNormals {
        fn estimate(&self, frame: &PointCloudFrame, _radius: f64) -> Vec<Normal> {
            vec![self.0; frame.len()]
        }
    }

    fn snapshot(points: &[(f32, f32)], params: GridParams) -> Snapshot {
        Snapshot {
            frame: Arc::new(
                points
                    .iter()
                    .map(|&(x, y)| ColoredPoint::xyz(x, y, 0.0))
                    .collect(),
            ),
            params,
            received_at: None,
        }
    }

    #[test]
    fn test_empty_frame_gives_single_cell() {
        let synth = GridSynthesizer::new(Box::new(FixedNormals(Normal::UP)));
        let out = synth
            .synthesize(&snapshot(&[], GridParams::default()), 1, Time::default())
            .unwrap();
        assert_eq!(out.message.info.width, 1);
        assert_eq!(out.message.info.height, 1);
        assert_eq!(out.message.data, vec![0]);
        assert_eq!(out.report.points, 0);
    }

    #[test]
    fn test_empty_frame_unknown_policy() {
        let params = GridParams {
            zero_count_policy: ZeroCountPolicy::Unknown,
            ..Default::default()
        };
        let synth = GridSynthesizer::new(Box::new(FixedNormals(Normal::UP)));
        let out = synth.synthesize(&snapshot(&[], params), 1, Time::default()).unwrap();
        assert_eq!(out.message.data, vec![-1]);
    }

    #[test]
    fn test_wall_cell_becomes_occupied_past_buffer() {
        let pts: Vec<(f32, f32)> = (0..6).map(|i| (0.3, 0.001 * i as f32)).collect();
        let params = GridParams {
            buffer: 5,
            ..Default::default()
        };
        let synth = GridSynthesizer::new(Box::new(FixedNormals(Normal::new(1.0, 0.0, 0.0))));
        let out = synth
            .synthesize(&snapshot(&pts, params), 3, Time::default())
            .unwrap();

        // Bounds start at the origin, so the grid spans x in [0, 0.3]
        assert_eq!(out.message.info.width, 7);
        assert_eq!(out.message.info.height, 1);
        assert_eq!(out.message.info.origin.position.x, 0.0);
        assert_eq!(out.message.cell(0, 6), Some(100));
        assert_eq!(out.message.cell(0, 0), Some(0));
        assert_eq!(out.report.occupied_cells, 1);
        assert_eq!(out.report.stats.obstacle_points, 6);
        assert_eq!(out.message.header.seq, 3);
    }

    #[test]
    fn test_repeat_synthesis_is_identical() {
        let pts: Vec<(f32, f32)> = (0..50)
            .map(|i| (0.013 * i as f32 - 0.2, 0.007 * i as f32))
            .collect();
        let snap = snapshot(&pts, GridParams::default());
        let synth = GridSynthesizer::default();
        let a = synth.synthesize(&snap, 1, Time::default()).unwrap();
        let b = synth
            .synthesize(&snap, 2, Time { sec: 5, nanosec: 0 })
            .unwrap();
        assert_eq!(a.message.data, b.message.data);
        assert_eq!(a.message.info.width, b.message.info.width);
        assert_eq!(a.message.info.height, b.message.info.height);
        assert_eq!(a.message.info.origin, b.message.info.origin);
        assert_eq!(a.report.stats, b.report.stats);
    }

    /// Panics if asked for normals; the size check must come first.
    struct NoNormals;

    impl NormalEstimator for NoNormals {
        fn estimate(&self, _frame: &PointCloudFrame, _radius: f64) -> Vec<Normal> {
            panic!("normals estimated for an oversized grid");
        }
    }

    #[test]
    fn test_far_outlier_is_refused_before_estimation() {
        let synth = GridSynthesizer::new(Box::new(NoNormals));
        let snap = snapshot(&[(0.0, 0.0), (1e20, 0.0)], GridParams::default());
        let err = synth.synthesize(&snap, 1, Time::default()).unwrap_err();
        assert!(matches!(err, BhumiError::GridTooLarge { .. }));
    }
}
