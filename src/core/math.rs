//! Small fixed-size linear algebra for plane fitting.
//!
//! Neighborhoods are at most a few hundred points, so everything here is
//! plain `f64` arithmetic on 3-vectors and 3x3 matrices. Accumulation is
//! done in `f64` even though points are stored as `f32`.

use crate::core::types::Point3D;

/// Row-major 3x3 matrix.
pub type Matrix3 = [[f64; 3]; 3];

/// Maximum Jacobi sweeps. Symmetric 3x3 matrices converge in well under 10.
const MAX_JACOBI_SWEEPS: usize = 32;

/// Mean of a set of points.
///
/// Returns `None` for an empty set.
pub fn compute_centroid<I>(points: I) -> Option<[f64; 3]>
where
    I: IntoIterator<Item = Point3D>,
{
    let mut sum = [0.0f64; 3];
    let mut n = 0usize;
    for p in points {
        sum[0] += p.x as f64;
        sum[1] += p.y as f64;
        sum[2] += p.z as f64;
        n += 1;
    }
    if n == 0 {
        return None;
    }
    let inv = 1.0 / n as f64;
    Some([sum[0] * inv, sum[1] * inv, sum[2] * inv])
}

/// Covariance matrix of a set of points about `centroid`.
///
/// Normalized by N (population covariance); the scale does not affect the
/// eigenvectors. Returns the zero matrix for an empty set.
pub fn compute_covariance<I>(points: I, centroid: [f64; 3]) -> Matrix3
where
    I: IntoIterator<Item = Point3D>,
{
    let mut cov = [[0.0f64; 3]; 3];
    let mut n = 0usize;
    for p in points {
        let d = [
            p.x as f64 - centroid[0],
            p.y as f64 - centroid[1],
            p.z as f64 - centroid[2],
        ];
        for (i, row) in cov.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate().skip(i) {
                *cell += d[i] * d[j];
            }
        }
        n += 1;
    }
    if n == 0 {
        return cov;
    }
    let inv = 1.0 / n as f64;
    for i in 0..3 {
        for j in i..3 {
            cov[i][j] *= inv;
            cov[j][i] = cov[i][j];
        }
    }
    cov
}

/// Eigen-decomposition of a symmetric 3x3 matrix by cyclic Jacobi rotation.
///
/// Returns `(eigenvalues, eigenvectors)` where column `k` of the second
/// matrix is the unit eigenvector for `eigenvalues[k]`. Order is unspecified.
///
/// Returns `None` if the input contains non-finite values.
pub fn symmetric_eigen3(m: &Matrix3) -> Option<([f64; 3], Matrix3)> {
    if m.iter().flatten().any(|v| !v.is_finite()) {
        return None;
    }

    let mut a = *m;
    let mut v: Matrix3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    let scale: f64 = a.iter().flatten().map(|x| x * x).sum();
    let tolerance = scale * f64::EPSILON * f64::EPSILON;

    for _ in 0..MAX_JACOBI_SWEEPS {
        let off_diagonal = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        if off_diagonal <= tolerance {
            break;
        }

        for (p, q) in [(0usize, 1usize), (0, 2), (1, 2)] {
            if a[p][q] == 0.0 {
                continue;
            }

            // Rotation angle that zeroes a[p][q]:
            // θ = (a_qq - a_pp) / (2 a_pq), t = sgn(θ) / (|θ| + sqrt(θ² + 1))
            let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
            let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;

            // A ← Jᵀ A J, V ← V J
            for row in a.iter_mut() {
                let (akp, akq) = (row[p], row[q]);
                row[p] = c * akp - s * akq;
                row[q] = s * akp + c * akq;
            }
            for k in 0..3 {
                let (apk, aqk) = (a[p][k], a[q][k]);
                a[p][k] = c * apk - s * aqk;
                a[q][k] = s * apk + c * aqk;
            }
            for row in v.iter_mut() {
                let (vkp, vkq) = (row[p], row[q]);
                row[p] = c * vkp - s * vkq;
                row[q] = s * vkp + c * vkq;
            }
        }
    }

    Some(([a[0][0], a[1][1], a[2][2]], v))
}

/// Middle-to-largest eigenvalue ratio below which a neighborhood is treated
/// as a line or a single point rather than a surface.
const MIN_PLANARITY: f64 = 1e-6;

/// Normal of the plane best fitting a neighborhood, from its covariance.
///
/// This is the unit eigenvector of the smallest eigenvalue (the direction of
/// least variance). Returns `None` when no plane is defined: non-finite input,
/// coincident points, or collinear points.
pub fn plane_normal(m: &Matrix3) -> Option<[f64; 3]> {
    let (values, vectors) = symmetric_eigen3(m)?;

    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let [min_idx, mid_idx, max_idx] = order;

    if values[max_idx] <= 0.0 || values[mid_idx] <= MIN_PLANARITY * values[max_idx] {
        return None;
    }

    let e = [
        vectors[0][min_idx],
        vectors[1][min_idx],
        vectors[2][min_idx],
    ];
    let norm = (e[0] * e[0] + e[1] * e[1] + e[2] * e[2]).sqrt();
    if norm < f64::EPSILON {
        return None;
    }
    Some([e[0] / norm, e[1] / norm, e[2] / norm])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn mat_vec(m: &Matrix3, v: [f64; 3]) -> [f64; 3] {
        [
            m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
            m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
            m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
        ]
    }

    #[test]
    fn test_centroid() {
        let pts = [
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(2.0, 0.0, 0.0),
            Point3D::new(0.0, 4.0, 6.0),
        ];
        let c = compute_centroid(pts).unwrap();
        assert_relative_eq!(c[0], 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(c[1], 4.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(c[2], 2.0, epsilon = 1e-12);
        assert!(compute_centroid(std::iter::empty()).is_none());
    }

    #[test]
    fn test_covariance_is_symmetric() {
        let pts = vec![
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(1.0, 2.0, 0.5),
            Point3D::new(-1.0, 0.5, 1.0),
            Point3D::new(0.3, -0.7, 0.2),
        ];
        let c = compute_centroid(pts.iter().copied()).unwrap();
        let cov = compute_covariance(pts.iter().copied(), c);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(cov[i][j], cov[j][i]);
            }
        }
        assert!(cov[0][0] > 0.0 && cov[1][1] > 0.0 && cov[2][2] > 0.0);
    }

    #[test]
    fn test_eigen_diagonal() {
        let m = [[3.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 1.0]];
        let e = plane_normal(&m).unwrap();
        assert_relative_eq!(e[2].abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_neighborhoods_have_no_plane() {
        // Coincident points
        assert!(plane_normal(&[[0.0; 3]; 3]).is_none());
        // Points along the X axis only
        let line = [[1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]];
        assert!(plane_normal(&line).is_none());
    }

    #[test]
    fn test_eigen_satisfies_definition() {
        let m = [[4.0, 1.0, 0.5], [1.0, 3.0, 0.25], [0.5, 0.25, 2.0]];
        let (values, vectors) = symmetric_eigen3(&m).unwrap();
        for k in 0..3 {
            let v = [vectors[0][k], vectors[1][k], vectors[2][k]];
            let mv = mat_vec(&m, v);
            for i in 0..3 {
                assert_relative_eq!(mv[i], values[k] * v[i], epsilon = 1e-9);
            }
        }
        // Trace is preserved
        assert_relative_eq!(values.iter().sum::<f64>(), 9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_plane_covariance_gives_plane_normal() {
        // Points on the plane x + z = 0 (tilted 45°)
        let mut pts = Vec::new();
        for i in -3..=3 {
            for j in -3..=3 {
                let x = i as f32 * 0.01;
                let y = j as f32 * 0.01;
                pts.push(Point3D::new(x, y, -x));
            }
        }
        let c = compute_centroid(pts.iter().copied()).unwrap();
        let cov = compute_covariance(pts.iter().copied(), c);
        let n = plane_normal(&cov).unwrap();
        let expected = std::f64::consts::FRAC_1_SQRT_2;
        assert_relative_eq!(n[0].abs(), expected, epsilon = 1e-5);
        assert_relative_eq!(n[1].abs(), 0.0, epsilon = 1e-5);
        assert_relative_eq!(n[2].abs(), expected, epsilon = 1e-5);
    }

    #[test]
    fn test_eigen_rejects_nan() {
        let m = [[f64::NAN, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert!(symmetric_eigen3(&m).is_none());
    }
}
