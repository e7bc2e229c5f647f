//! Error types for Bhumi

use thiserror::Error;

/// Bhumi error type
#[derive(Error, Debug)]
pub enum BhumiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parameter {field} out of range: {value}")]
    ConfigOutOfRange { field: &'static str, value: f64 },

    #[error("Grid of {width}x{height} cells exceeds the {max_cells} cell limit")]
    GridTooLarge {
        width: usize,
        height: usize,
        max_cells: usize,
    },

    #[error("Wire error: {0}")]
    Wire(String),

    #[error("PCD error: {0}")]
    Pcd(String),

    #[error("Transport disconnected: {0}")]
    TransportDisconnected(String),

    #[error("Publish failed: {0}")]
    Publish(String),
}

impl From<toml::de::Error> for BhumiError {
    fn from(e: toml::de::Error) -> Self {
        BhumiError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for BhumiError {
    fn from(e: serde_json::Error) -> Self {
        BhumiError::Wire(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BhumiError>;
