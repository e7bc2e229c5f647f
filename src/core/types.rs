//! Point cloud and normal types.

use serde::{Deserialize, Serialize};

/// A 3D point in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3D {
    /// X coordinate in meters
    pub x: f32,
    /// Y coordinate in meters
    pub y: f32,
    /// Z coordinate in meters
    pub z: f32,
}

impl Point3D {
    /// Create a new point.
    #[inline]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// True if all three coordinates are finite.
    ///
    /// Organized depth clouds mark missing returns with NaN.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Coordinates as an array, the layout the k-d tree expects.
    #[inline]
    pub fn to_array(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// A colored point as delivered by an RGB-D sensor.
///
/// Color is carried through untouched; classification only looks at
/// position and the estimated normal. Missing color fields decode as black.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ColoredPoint {
    /// X coordinate in meters
    pub x: f32,
    /// Y coordinate in meters
    pub y: f32,
    /// Z coordinate in meters
    pub z: f32,
    /// Red channel
    #[serde(default)]
    pub r: u8,
    /// Green channel
    #[serde(default)]
    pub g: u8,
    /// Blue channel
    #[serde(default)]
    pub b: u8,
}

impl ColoredPoint {
    /// Create a colored point.
    #[inline]
    pub fn new(x: f32, y: f32, z: f32, r: u8, g: u8, b: u8) -> Self {
        Self { x, y, z, r, g, b }
    }

    /// Create an uncolored (black) point.
    #[inline]
    pub fn xyz(x: f32, y: f32, z: f32) -> Self {
        Self::new(x, y, z, 0, 0, 0)
    }

    /// Position without color.
    #[inline]
    pub fn position(&self) -> Point3D {
        Point3D::new(self.x, self.y, self.z)
    }
}

/// One point cloud frame.
///
/// Frames are immutable once received and are replaced wholesale by the
/// next one; there is no incremental merge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PointCloudFrame {
    /// Points in sensor order.
    pub points: Vec<ColoredPoint>,
}

impl PointCloudFrame {
    /// Create an empty frame.
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Create a frame from points.
    pub fn from_points(points: Vec<ColoredPoint>) -> Self {
        Self { points }
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if the frame has no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate over point positions.
    pub fn positions(&self) -> impl Iterator<Item = Point3D> + '_ {
        self.points.iter().map(ColoredPoint::position)
    }
}

impl FromIterator<ColoredPoint> for PointCloudFrame {
    fn from_iter<I: IntoIterator<Item = ColoredPoint>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// Surface normal at a point.
///
/// A normal is either a unit vector or undefined (all NaN) when the
/// neighborhood was too small to fit a plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normal {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Normal {
    /// Marker for "no plane could be fitted".
    pub const UNDEFINED: Normal = Normal {
        x: f32::NAN,
        y: f32::NAN,
        z: f32::NAN,
    };

    /// Straight up, the normal of level ground.
    pub const UP: Normal = Normal {
        x: 0.0,
        y: 0.0,
        z: 1.0,
    };

    /// Create a normal from raw components (no normalization).
    #[inline]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// True unless this is [`Normal::UNDEFINED`] or otherwise non-finite.
    #[inline]
    pub fn is_defined(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Angle between this normal and the vertical axis, in `[0, π/2]`.
    ///
    /// Computed as `acos(|z|)`, so the normal's sign does not matter. Near 0
    /// means ground-like, near π/2 means wall-like. Returns NaN for an
    /// undefined normal; NaN compares false against any threshold.
    #[inline]
    pub fn deviation_angle(&self) -> f64 {
        if !self.is_defined() {
            return f64::NAN;
        }
        // Unit vectors can drift a hair above 1.0 after rounding
        (self.z.abs() as f64).min(1.0).acos()
    }
}

impl Default for Normal {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_deviation_angle_vertical_and_horizontal() {
        assert_relative_eq!(Normal::UP.deviation_angle(), 0.0);
        assert_relative_eq!(Normal::new(0.0, 0.0, -1.0).deviation_angle(), 0.0);
        assert_relative_eq!(
            Normal::new(1.0, 0.0, 0.0).deviation_angle(),
            FRAC_PI_2,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_deviation_angle_tolerates_rounding_above_one() {
        let n = Normal::new(0.0, 0.0, 1.000_000_1);
        assert_relative_eq!(n.deviation_angle(), 0.0);
    }

    #[test]
    fn test_undefined_normal_never_exceeds_threshold() {
        let angle = Normal::UNDEFINED.deviation_angle();
        assert!(angle.is_nan());
        let exceeds = angle > 0.1;
        assert!(!exceeds);
    }

    #[test]
    fn test_colored_point_decodes_without_color() {
        let p: ColoredPoint = serde_json::from_str(r#"{"x":1.0,"y":2.0,"z":3.0}"#).unwrap();
        assert_eq!(p, ColoredPoint::xyz(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_point_finiteness() {
        assert!(Point3D::new(0.0, 1.0, 2.0).is_finite());
        assert!(!Point3D::new(f32::NAN, 1.0, 2.0).is_finite());
        assert!(!Point3D::new(0.0, f32::INFINITY, 2.0).is_finite());
    }
}
