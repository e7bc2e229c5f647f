//! ASCII PCD loader for replaying recorded frames.
//!
//! Supports the header produced by common point cloud tools:
//!
//! ```text
//! VERSION 0.7
//! FIELDS x y z rgb
//! SIZE 4 4 4 4
//! TYPE F F F F
//! COUNT 1 1 1 1
//! WIDTH 640
//! HEIGHT 480
//! VIEWPOINT 0 0 0 1 0 0 0
//! POINTS 307200
//! DATA ascii
//! ```
//!
//! `x y z` are required. Color comes from an `rgb` or `rgba` field packed as
//! `0x00RRGGBB`, stored either as a float (`TYPE F`, bit-reinterpreted) or as
//! an unsigned integer. Other fields are skipped. Only `DATA ascii` is read.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::core::types::{ColoredPoint, PointCloudFrame};
use crate::error::{BhumiError, Result};

/// Most points reserved up front; the header count is untrusted.
const PREALLOC_POINTS: usize = 1 << 20;

/// Parsed header: column layout and point count.
#[derive(Debug, Default)]
struct Header {
    fields: Vec<String>,
    types: Vec<char>,
    counts: Vec<usize>,
    points: Option<usize>,
    width: Option<usize>,
    height: Option<usize>,
}

/// Column offsets of the fields we read.
#[derive(Debug)]
struct Layout {
    x: usize,
    y: usize,
    z: usize,
    rgb: Option<(usize, char)>,
    columns: usize,
}

impl Header {
    fn layout(&self) -> Result<Layout> {
        if self.fields.is_empty() {
            return Err(BhumiError::Pcd("missing FIELDS line".to_string()));
        }

        let mut offsets = Vec::with_capacity(self.fields.len());
        let mut column = 0;
        for i in 0..self.fields.len() {
            offsets.push(column);
            column = self
                .counts
                .get(i)
                .copied()
                .unwrap_or(1)
                .checked_add(column)
                .ok_or_else(|| BhumiError::Pcd("COUNT values overflow".to_string()))?;
        }

        let find = |name: &str| self.fields.iter().position(|f| f == name);
        let offset_of = |name: &str| {
            find(name)
                .map(|i| offsets[i])
                .ok_or_else(|| BhumiError::Pcd(format!("missing field '{}'", name)))
        };

        let rgb = find("rgb")
            .or_else(|| find("rgba"))
            .map(|i| (offsets[i], self.types.get(i).copied().unwrap_or('F')));

        Ok(Layout {
            x: offset_of("x")?,
            y: offset_of("y")?,
            z: offset_of("z")?,
            rgb,
            columns: column,
        })
    }

    fn expected_points(&self) -> Result<Option<usize>> {
        if self.points.is_some() {
            return Ok(self.points);
        }
        let Some(width) = self.width else {
            return Ok(None);
        };
        width
            .checked_mul(self.height.unwrap_or(1))
            .map(Some)
            .ok_or_else(|| BhumiError::Pcd("WIDTH x HEIGHT overflows".to_string()))
    }
}

/// Load an ASCII PCD file.
pub fn load_pcd(path: &Path) -> Result<PointCloudFrame> {
    let file = File::open(path)
        .map_err(|e| BhumiError::Pcd(format!("cannot open {}: {}", path.display(), e)))?;
    let frame = parse_pcd(BufReader::new(file))?;
    log::info!("Loaded {} points from {}", frame.len(), path.display());
    Ok(frame)
}

/// Parse ASCII PCD from any buffered reader.
pub fn parse_pcd<R: BufRead>(reader: R) -> Result<PointCloudFrame> {
    let mut lines = reader.lines();
    let mut header = Header::default();

    // Header runs up to and including the DATA line
    loop {
        let Some(line) = lines.next() else {
            return Err(BhumiError::Pcd("missing DATA line".to_string()));
        };
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let key = tokens.next().unwrap_or_default().to_ascii_uppercase();
        let values: Vec<&str> = tokens.collect();
        match key.as_str() {
            "FIELDS" => header.fields = values.iter().map(|s| s.to_string()).collect(),
            "TYPE" => {
                header.types = values
                    .iter()
                    .map(|s| s.chars().next().unwrap_or('F').to_ascii_uppercase())
                    .collect()
            }
            "COUNT" => header.counts = parse_all(&values, "COUNT")?,
            "POINTS" => header.points = Some(parse_one(&values, "POINTS")?),
            "WIDTH" => header.width = Some(parse_one(&values, "WIDTH")?),
            "HEIGHT" => header.height = Some(parse_one(&values, "HEIGHT")?),
            "DATA" => {
                let kind = values.first().copied().unwrap_or_default();
                if !kind.eq_ignore_ascii_case("ascii") {
                    return Err(BhumiError::Pcd(format!(
                        "unsupported DATA format '{}' (only ascii)",
                        kind
                    )));
                }
                break;
            }
            // VERSION, SIZE, VIEWPOINT carry nothing we need
            _ => {}
        }
    }

    let layout = header.layout()?;
    let expected = header.expected_points()?;
    let mut points = Vec::with_capacity(expected.unwrap_or(0).min(PREALLOC_POINTS));

    for (row, line) in lines.enumerate() {
        if expected.is_some_and(|n| points.len() >= n) {
            break;
        }
        let line = line?;
        let values: Vec<&str> = line.split_whitespace().collect();
        if values.is_empty() {
            continue;
        }
        if values.len() < layout.columns {
            return Err(BhumiError::Pcd(format!(
                "data row {} has {} values, expected {}",
                row + 1,
                values.len(),
                layout.columns
            )));
        }
        points.push(parse_point(&values, &layout, row)?);
    }

    if let Some(n) = expected
        && points.len() < n
    {
        return Err(BhumiError::Pcd(format!(
            "truncated data: {} of {} points",
            points.len(),
            n
        )));
    }

    Ok(PointCloudFrame::from_points(points))
}

fn parse_point(values: &[&str], layout: &Layout, row: usize) -> Result<ColoredPoint> {
    let coord = |col: usize| -> Result<f32> {
        values[col].parse::<f32>().map_err(|_| {
            BhumiError::Pcd(format!("bad coordinate '{}' in row {}", values[col], row + 1))
        })
    };
    let (x, y, z) = (coord(layout.x)?, coord(layout.y)?, coord(layout.z)?);

    let packed = match layout.rgb {
        None => 0,
        Some((col, 'F')) => values[col].parse::<f32>().map(f32::to_bits).unwrap_or(0),
        Some((col, _)) => values[col].parse::<u32>().unwrap_or(0),
    };
    let [_, r, g, b] = packed.to_be_bytes();

    Ok(ColoredPoint::new(x, y, z, r, g, b))
}

fn parse_one(values: &[&str], key: &str) -> Result<usize> {
    values
        .first()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| BhumiError::Pcd(format!("bad {} line", key)))
}

fn parse_all(values: &[&str], key: &str) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|v| {
            v.parse()
                .map_err(|_| BhumiError::Pcd(format!("bad {} value '{}'", key, v)))
        })
        .collect()
}
