//! Radius-neighborhood PCA normals over a k-d tree.

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use rayon::prelude::*;

use super::NormalEstimator;
use crate::core::math::{compute_centroid, compute_covariance, plane_normal};
use crate::core::types::{Normal, Point3D, PointCloudFrame};

/// Fewest neighbors (the query point included) that can define a plane.
const MIN_NEIGHBORS: usize = 3;

/// Normal estimator backed by a `kiddo` k-d tree.
///
/// For each point:
/// 1. Gather every finite point within `radius`
/// 2. Fit a plane as the least-variance direction of their covariance
/// 3. Orient the normal toward the viewpoint
///
/// Points are processed in parallel with rayon.
#[derive(Debug, Clone)]
pub struct KdTreeNormalEstimator {
    viewpoint: [f64; 3],
}

impl KdTreeNormalEstimator {
    /// Estimator with the viewpoint at the sensor origin.
    pub fn new() -> Self {
        Self {
            viewpoint: [0.0; 3],
        }
    }

    /// Estimator that orients normals toward `viewpoint`.
    pub fn with_viewpoint(viewpoint: [f64; 3]) -> Self {
        Self { viewpoint }
    }

    fn normal_at(
        &self,
        tree: &ImmutableKdTree<f32, 3>,
        entries: &[[f32; 3]],
        p: Point3D,
        radius_sq: f32,
    ) -> Normal {
        if !p.is_finite() {
            return Normal::UNDEFINED;
        }

        let neighbors = tree.within_unsorted::<SquaredEuclidean>(&p.to_array(), radius_sq);
        if neighbors.len() < MIN_NEIGHBORS {
            return Normal::UNDEFINED;
        }

        let positions = || {
            neighbors.iter().map(|n| {
                let [x, y, z] = entries[n.item as usize];
                Point3D::new(x, y, z)
            })
        };
        let Some(centroid) = compute_centroid(positions()) else {
            return Normal::UNDEFINED;
        };
        let cov = compute_covariance(positions(), centroid);
        let Some(mut n) = plane_normal(&cov) else {
            return Normal::UNDEFINED;
        };

        // Flip so the normal faces the viewpoint
        let to_view = [
            self.viewpoint[0] - p.x as f64,
            self.viewpoint[1] - p.y as f64,
            self.viewpoint[2] - p.z as f64,
        ];
        if n[0] * to_view[0] + n[1] * to_view[1] + n[2] * to_view[2] < 0.0 {
            n = [-n[0], -n[1], -n[2]];
        }

        Normal::new(n[0] as f32, n[1] as f32, n[2] as f32)
    }
}

impl Default for KdTreeNormalEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalEstimator for KdTreeNormalEstimator {
    fn estimate(&self, frame: &PointCloudFrame, radius: f64) -> Vec<Normal> {
        let entries: Vec<[f32; 3]> = frame
            .positions()
            .filter(Point3D::is_finite)
            .map(|p| p.to_array())
            .collect();

        if entries.len() < MIN_NEIGHBORS || !radius.is_finite() || radius <= 0.0 {
            return vec![Normal::UNDEFINED; frame.len()];
        }

        let tree = ImmutableKdTree::new_from_slice(&entries);
        let radius_sq = (radius * radius) as f32;

        let normals: Vec<Normal> = frame
            .points
            .par_iter()
            .map(|p| self.normal_at(&tree, &entries, p.position(), radius_sq))
            .collect();

        let undefined = normals.iter().filter(|n| !n.is_defined()).count();
        if undefined > 0 {
            log::trace!(
                "Normal estimation: {} of {} points without a plane fit (radius {:.3}m)",
                undefined,
                normals.len(),
                radius
            );
        }
        normals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ColoredPoint;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    /// Jittered grid of points on a plane through `origin` spanned by `u` and `v`.
    ///
    /// The jitter keeps coordinates from repeating exactly along any axis.
    fn plane_patch(
        origin: [f32; 3],
        u: [f32; 3],
        v: [f32; 3],
        n: i32,
        step: f32,
    ) -> Vec<ColoredPoint> {
        let w = [
            u[1] * v[2] - u[2] * v[1],
            u[2] * v[0] - u[0] * v[2],
            u[0] * v[1] - u[1] * v[0],
        ];
        let mut pts = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let a = i as f32 * step + (j % 3) as f32 * 1e-4;
                let b = j as f32 * step + (i % 5) as f32 * 1e-4;
                let c = ((i + 2 * j) % 4) as f32 * 2e-5;
                pts.push(ColoredPoint::xyz(
                    origin[0] + a * u[0] + b * v[0] + c * w[0],
                    origin[1] + a * u[1] + b * v[1] + c * w[1],
                    origin[2] + a * u[2] + b * v[2] + c * w[2],
                ));
            }
        }
        pts
    }

    #[test]
    fn test_floor_normals_are_vertical_and_face_sensor() {
        // Floor 1m below the sensor
        let frame = PointCloudFrame::from_points(plane_patch(
            [-0.2, -0.2, -1.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            20,
            0.02,
        ));
        let normals = KdTreeNormalEstimator::new().estimate(&frame, 0.05);
        assert_eq!(normals.len(), frame.len());
        for n in &normals {
            assert!(n.is_defined());
            assert_relative_eq!(n.z, 1.0, epsilon = 1e-3);
            assert!(n.deviation_angle() < 0.05);
        }
    }

    #[test]
    fn test_wall_normals_are_horizontal() {
        // Wall at x = 1 facing the sensor
        let frame = PointCloudFrame::from_points(plane_patch(
            [1.0, -0.2, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            20,
            0.02,
        ));
        let normals = KdTreeNormalEstimator::new().estimate(&frame, 0.05);
        for n in &normals {
            assert!(n.is_defined());
            assert_relative_eq!(n.x, -1.0, epsilon = 1e-3);
            assert!(n.deviation_angle() > FRAC_PI_4);
            assert_relative_eq!(n.deviation_angle(), FRAC_PI_2, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_sparse_and_non_finite_points_are_undefined() {
        let frame = PointCloudFrame::from_points(vec![
            ColoredPoint::xyz(0.0, 0.0, 0.0),
            ColoredPoint::xyz(5.0, 0.0, 0.0),
            ColoredPoint::xyz(0.0, 5.0, 0.0),
            ColoredPoint::xyz(f32::NAN, 0.0, 0.0),
        ]);
        let normals = KdTreeNormalEstimator::new().estimate(&frame, 0.05);
        assert_eq!(normals.len(), 4);
        assert!(normals.iter().all(|n| !n.is_defined()));
    }

    #[test]
    fn test_empty_frame_and_bad_radius() {
        let est = KdTreeNormalEstimator::new();
        assert!(est.estimate(&PointCloudFrame::new(), 0.05).is_empty());

        let frame = PointCloudFrame::from_points(plane_patch(
            [0.0, 0.0, -1.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            5,
            0.01,
        ));
        let normals = est.estimate(&frame, 0.0);
        assert_eq!(normals.len(), frame.len());
        assert!(normals.iter().all(|n| !n.is_defined()));
    }

    #[test]
    fn test_viewpoint_orientation() {
        let frame = PointCloudFrame::from_points(plane_patch(
            [-0.1, -0.1, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            10,
            0.02,
        ));
        let below = KdTreeNormalEstimator::with_viewpoint([0.0, 0.0, -2.0]).estimate(&frame, 0.05);
        assert!(below.iter().all(|n| n.z < 0.0));
        let above = KdTreeNormalEstimator::with_viewpoint([0.0, 0.0, 2.0]).estimate(&frame, 0.05);
        assert!(above.iter().all(|n| n.z > 0.0));
    }
}
