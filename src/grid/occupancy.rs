//! Count-to-occupancy thresholding.

use serde::{Deserialize, Serialize};

use super::bounds::GridDims;
use super::count::CountGrid;

/// Occupancy value of one cell, as published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum CellValue {
    Unknown = -1,
    Free = 0,
    Occupied = 100,
}

impl CellValue {
    /// Wire value.
    #[inline]
    pub fn as_i8(self) -> i8 {
        self as i8
    }
}

/// How cells with zero obstacle evidence are reported.
///
/// A cell with no obstacle points may simply have seen no points at all, so
/// `Unknown` is the more honest answer. The node has always published `Free`
/// for them and downstream planners expect that, so `Free` stays the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroCountPolicy {
    #[default]
    Free,
    Unknown,
}

/// Thresholded grid, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyGrid {
    pub dims: GridDims,
    pub cells: Vec<CellValue>,
}

impl OccupancyGrid {
    /// Number of occupied cells.
    pub fn occupied_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|&&c| c == CellValue::Occupied)
            .count()
    }

    /// Cell values as wire bytes.
    pub fn to_data(&self) -> Vec<i8> {
        self.cells.iter().map(|c| c.as_i8()).collect()
    }
}

/// Classify one cell count.
#[inline]
pub fn classify_cell(count: u32, buffer: u32, policy: ZeroCountPolicy) -> CellValue {
    if count > buffer {
        CellValue::Occupied
    } else if count > 0 {
        CellValue::Free
    } else {
        match policy {
            ZeroCountPolicy::Free => CellValue::Free,
            ZeroCountPolicy::Unknown => CellValue::Unknown,
        }
    }
}

/// Map every count to an occupancy value.
///
/// A cell is occupied only when it holds more than `buffer` obstacle points,
/// so `buffer` absorbs sensor noise.
pub fn threshold(counts: &CountGrid, buffer: u32, policy: ZeroCountPolicy) -> OccupancyGrid {
    OccupancyGrid {
        dims: counts.dims,
        cells: counts
            .counts
            .iter()
            .map(|&c| classify_cell(c, buffer, policy))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(counts: Vec<u32>) -> CountGrid {
        CountGrid {
            dims: GridDims {
                width: counts.len(),
                height: 1,
            },
            counts,
        }
    }

    #[test]
    fn test_classify_cell() {
        assert_eq!(classify_cell(0, 5, ZeroCountPolicy::Free), CellValue::Free);
        assert_eq!(
            classify_cell(0, 5, ZeroCountPolicy::Unknown),
            CellValue::Unknown
        );
        assert_eq!(classify_cell(5, 5, ZeroCountPolicy::Free), CellValue::Free);
        assert_eq!(classify_cell(6, 5, ZeroCountPolicy::Free), CellValue::Occupied);
        assert_eq!(classify_cell(1, 0, ZeroCountPolicy::Unknown), CellValue::Occupied);
    }

    #[test]
    fn test_threshold_values_and_wire_bytes() {
        let occ = threshold(&grid(vec![0, 3, 4, 9]), 3, ZeroCountPolicy::Unknown);
        assert_eq!(occ.to_data(), vec![-1, 0, 100, 100]);
        assert_eq!(occ.occupied_count(), 2);
    }

    #[test]
    fn test_raising_buffer_only_frees_cells() {
        let counts = grid((0..40).collect());
        let mut previous = threshold(&counts, 0, ZeroCountPolicy::Free);
        for buffer in 1..45 {
            let current = threshold(&counts, buffer, ZeroCountPolicy::Free);
            for (before, after) in previous.cells.iter().zip(&current.cells) {
                if *before == CellValue::Free {
                    assert_eq!(*after, CellValue::Free);
                }
            }
            assert!(current.occupied_count() <= previous.occupied_count());
            previous = current;
        }
        assert_eq!(previous.occupied_count(), 0);
    }

    #[test]
    fn test_policy_serde_names() {
        let p: ZeroCountPolicy = serde_json::from_str("\"unknown\"").unwrap();
        assert_eq!(p, ZeroCountPolicy::Unknown);
        assert_eq!(serde_json::to_string(&ZeroCountPolicy::Free).unwrap(), "\"free\"");
    }
}
