//! Core foundation layer.
//!
//! This is the bottom layer of the stack with no internal dependencies.
//! All other layers depend on core.
//!
//! # Contents
//!
//! - [`types`]: Point, color, frame and normal types
//! - [`math`]: Small fixed-size linear algebra (centroid, covariance, 3x3 eigen)

pub mod math;
pub mod types;

pub use types::{ColoredPoint, Normal, Point3D, PointCloudFrame};
