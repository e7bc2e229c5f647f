//! Bhumi - point cloud to 2D occupancy grid synthesis
//!
//! Turns a stream of colored 3D point cloud frames into binary occupancy
//! grids for navigation. Each point is classified as ground or obstacle from
//! how far its surface normal tilts away from vertical; a cell is occupied
//! when it collects more obstacle points than the noise buffer allows.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      main                           │  ← Entry point
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                      io/                            │  ← Infrastructure
//! │         (wire, receiver, publisher, pcd)            │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   scheduler                         │  ← Orchestration
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │              grid/        normals/                  │  ← Core algorithms
//! │  (bounds, count, threshold)  (k-d tree PCA)         │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                config, state                        │  ← Shared state
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                (types, math)                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Data Flow
//!
//! ```text
//! TCP source ──► FrameSink ──► SharedState ◄── ConfigStore ◄── TCP reconfigure
//!                                   │
//!                         Scheduler::tick (take_pending)
//!                                   │
//!             NormalEstimator ──► GridSynthesizer ──► GridPublisher ──► subscribers
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod grid;
pub mod io;
pub mod normals;
pub mod scheduler;
pub mod state;

pub use config::{GridParams, NodeConfig};
pub use crate::core::types::{ColoredPoint, Normal, Point3D, PointCloudFrame};
pub use error::{BhumiError, Result};
pub use grid::{CellValue, GridMessage, GridSynthesizer, ZeroCountPolicy};
pub use io::{ChannelPublisher, FrameReceiver, GridPublisher, TcpGridPublisher};
pub use normals::{KdTreeNormalEstimator, NormalEstimator};
pub use scheduler::{Scheduler, SchedulerState, SchedulerStats, TickOutcome};
pub use state::{ConfigStore, FrameSink, SharedState, Snapshot};
