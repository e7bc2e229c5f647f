//! Published grid message.
//!
//! Field layout follows the ROS `nav_msgs/OccupancyGrid` message so a bridge
//! can forward it without reshaping.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::bounds::{GridBounds, GridDims};
use super::occupancy::OccupancyGrid;

/// Wall-clock timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Time {
    pub sec: i64,
    pub nanosec: u32,
}

impl Time {
    /// Current wall-clock time. Clocks before the epoch read as zero.
    pub fn now() -> Self {
        SystemTime::now().into()
    }
}

impl From<SystemTime> for Time {
    fn from(t: SystemTime) -> Self {
        match t.duration_since(UNIX_EPOCH) {
            Ok(d) => Self {
                sec: i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
                nanosec: d.subsec_nanos(),
            },
            Err(_) => Self::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Cycle sequence number, starting at 1
    pub seq: u64,
    pub stamp: Time,
    pub frame_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Position,
    pub orientation: Quaternion,
}

/// Grid geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMetaData {
    /// Time the grid was synthesized
    pub map_load_time: Time,
    /// Meters per cell
    pub resolution: f64,
    /// Cells along X
    pub width: u32,
    /// Cells along Y
    pub height: u32,
    /// World pose of cell (0, 0)
    pub origin: Pose,
}

/// One synthesized occupancy grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridMessage {
    pub header: Header,
    pub info: MapMetaData,
    /// Row-major cell values in {-1, 0, 100}, length `width * height`
    pub data: Vec<i8>,
}

impl GridMessage {
    /// Value at (row, col), if in range.
    pub fn cell(&self, row: usize, col: usize) -> Option<i8> {
        let width = self.info.width as usize;
        if col >= width {
            return None;
        }
        self.data.get(row * width + col).copied()
    }
}

/// Build the outbound message for one cycle.
///
/// The origin is the grid's lower-left corner `(x_min, y_min, 0)` with
/// identity orientation.
pub fn assemble(
    occupancy: &OccupancyGrid,
    dims: GridDims,
    bounds: &GridBounds,
    cell_resolution: f64,
    seq: u64,
    stamp: Time,
    frame_id: &str,
) -> GridMessage {
    GridMessage {
        header: Header {
            seq,
            stamp,
            frame_id: frame_id.to_string(),
        },
        info: MapMetaData {
            map_load_time: stamp,
            resolution: cell_resolution,
            width: u32::try_from(dims.width).unwrap_or(u32::MAX),
            height: u32::try_from(dims.height).unwrap_or(u32::MAX),
            origin: Pose {
                position: Position {
                    x: bounds.x_min,
                    y: bounds.y_min,
                    z: 0.0,
                },
                orientation: Quaternion::IDENTITY,
            },
        },
        data: occupancy.to_data(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::occupancy::CellValue;
    use std::time::Duration;

    #[test]
    fn test_assemble_metadata() {
        let dims = GridDims { width: 2, height: 1 };
        let occ = OccupancyGrid {
            dims,
            cells: vec![CellValue::Free, CellValue::Occupied],
        };
        let bounds = GridBounds {
            x_min: -1.5,
            x_max: 0.0,
            y_min: -0.25,
            y_max: 0.0,
        };
        let stamp = Time {
            sec: 1_700_000_000,
            nanosec: 42,
        };
        let msg = assemble(&occ, dims, &bounds, 0.05, 7, stamp, "world");

        assert_eq!(msg.header.seq, 7);
        assert_eq!(msg.header.frame_id, "world");
        assert_eq!(msg.info.map_load_time, stamp);
        assert_eq!(msg.info.width, 2);
        assert_eq!(msg.info.height, 1);
        assert_eq!(msg.info.origin.position.x, -1.5);
        assert_eq!(msg.info.origin.position.y, -0.25);
        assert_eq!(msg.info.origin.position.z, 0.0);
        assert_eq!(msg.info.origin.orientation, Quaternion::IDENTITY);
        assert_eq!(msg.data, vec![0, 100]);
        assert_eq!(msg.cell(0, 1), Some(100));
        assert_eq!(msg.cell(0, 2), None);
    }

    #[test]
    fn test_time_from_system_time() {
        let t: Time = (UNIX_EPOCH + Duration::new(12, 345)).into();
        assert_eq!(t, Time { sec: 12, nanosec: 345 });
        let before: Time = (UNIX_EPOCH - Duration::from_secs(1)).into();
        assert_eq!(before, Time::default());
    }

    #[test]
    fn test_message_json_shape() {
        let dims = GridDims { width: 1, height: 1 };
        let occ = OccupancyGrid {
            dims,
            cells: vec![CellValue::Free],
        };
        let msg = assemble(&occ, dims, &GridBounds::default(), 0.05, 1, Time::default(), "map");
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["header"]["seq"], 1);
        assert_eq!(json["header"]["frame_id"], "map");
        assert_eq!(json["info"]["origin"]["orientation"]["w"], 1.0);
        assert_eq!(json["data"], serde_json::json!([0]));
    }
}
