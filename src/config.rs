//! Configuration loading for Bhumi
//!
//! Two layers:
//! - [`GridParams`]: the tunable synthesis parameters. These can be replaced
//!   wholesale at runtime by a reconfiguration event.
//! - [`NodeConfig`]: the full node configuration read once from TOML at
//!   startup (grid parameters plus transport addresses).

use crate::error::{BhumiError, Result};
use crate::grid::ZeroCountPolicy;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::path::Path;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub grid: GridParams,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Grid synthesis parameters.
///
/// A reconfiguration event carries a full snapshot of these; fields missing
/// from the event take their defaults rather than the previous values.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GridParams {
    /// Frame id stamped on every published grid (default: "world")
    #[serde(default = "default_frame_id", alias = "frame")]
    pub frame_id: String,

    /// Neighborhood radius for normal estimation in meters (default: 0.05)
    #[serde(default = "default_search_radius")]
    pub search_radius: f64,

    /// Maximum angle between normal and vertical for ground, radians (default: π/4)
    #[serde(default = "default_deviation")]
    pub deviation: f64,

    /// Obstacle points a cell may hold and still be free (default: 5)
    #[serde(default = "default_buffer")]
    pub buffer: u32,

    /// Scheduler tick rate in Hz (default: 10.0)
    #[serde(default = "default_loop_rate")]
    pub loop_rate: f64,

    /// Cell edge length in meters (default: 0.05)
    #[serde(default = "default_cell_resolution")]
    pub cell_resolution: f64,

    /// Value written to cells with no obstacle evidence (default: free)
    #[serde(default)]
    pub zero_count_policy: ZeroCountPolicy,
}

/// Inbound transport settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SourceConfig {
    /// TCP bind address for frames and reconfiguration events (default: 0.0.0.0:5560)
    #[serde(default = "default_source_bind")]
    pub bind_address: String,

    /// ASCII PCD file injected as the first frame (optional)
    #[serde(default)]
    pub replay: Option<String>,
}

/// Outbound transport settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OutputConfig {
    /// TCP bind address for grid subscribers (default: 0.0.0.0:5561)
    #[serde(default = "default_output_bind")]
    pub bind_address: String,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            frame_id: default_frame_id(),
            search_radius: default_search_radius(),
            deviation: default_deviation(),
            buffer: default_buffer(),
            loop_rate: default_loop_rate(),
            cell_resolution: default_cell_resolution(),
            zero_count_policy: ZeroCountPolicy::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            bind_address: default_source_bind(),
            replay: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            bind_address: default_output_bind(),
        }
    }
}

// Default value functions
fn default_frame_id() -> String {
    "world".to_string()
}
fn default_search_radius() -> f64 {
    0.05
}
fn default_deviation() -> f64 {
    FRAC_PI_4
}
fn default_buffer() -> u32 {
    5
}
fn default_loop_rate() -> f64 {
    10.0
}
fn default_cell_resolution() -> f64 {
    0.05
}
fn default_source_bind() -> String {
    "0.0.0.0:5560".to_string()
}
fn default_output_bind() -> String {
    "0.0.0.0:5561".to_string()
}

impl GridParams {
    /// Check every field against its documented range.
    ///
    /// Returns the first offending field.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("search_radius", self.search_radius),
            ("loop_rate", self.loop_rate),
            ("cell_resolution", self.cell_resolution),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(BhumiError::ConfigOutOfRange { field, value });
            }
        }
        if !(0.0..=FRAC_PI_2).contains(&self.deviation) {
            return Err(BhumiError::ConfigOutOfRange {
                field: "deviation",
                value: self.deviation,
            });
        }
        Ok(())
    }

    /// Tick period derived from `loop_rate`.
    ///
    /// Saturates instead of panicking for rates too small to represent.
    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::try_from_secs_f64(1.0 / self.loop_rate)
            .unwrap_or(std::time::Duration::MAX)
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BhumiError::Config(format!("Failed to read config file: {}", e)))?;
        let config: NodeConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
