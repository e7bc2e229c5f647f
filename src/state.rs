//! Shared state between the transport threads and the scheduler.
//!
//! One mutex guards the latest frame, its arrival time, the current grid
//! parameters and the two pending flags. Writers never see the mutex:
//! - Frame producers hold a [`FrameSink`]
//! - Reconfiguration producers hold a [`ConfigStore`]
//! - The scheduler calls [`SharedState::take_pending`]
//!
//! Every critical section is O(1). Frames are stored behind `Arc`, so the
//! scheduler's snapshot is a pointer copy and synthesis runs unlocked.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::GridParams;
use crate::core::types::PointCloudFrame;
use crate::error::Result;

/// Inputs for one synthesis cycle, captured atomically.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub frame: Arc<PointCloudFrame>,
    pub params: GridParams,
    /// When the frame was handed to the sink
    pub received_at: Option<Instant>,
}

#[derive(Debug)]
struct Inner {
    frame: Option<Arc<PointCloudFrame>>,
    received_at: Option<Instant>,
    new_frame: bool,
    params: GridParams,
    config_changed: bool,
}

/// Single-slot mailbox plus live parameters.
#[derive(Debug)]
pub struct SharedState {
    inner: Mutex<Inner>,
    frames_received: AtomicU64,
    frames_overwritten: AtomicU64,
    reconfigurations_rejected: AtomicU64,
}

impl SharedState {
    /// Create shared state with initial parameters and no frame.
    pub fn new(params: GridParams) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                frame: None,
                received_at: None,
                new_frame: false,
                params,
                config_changed: false,
            }),
            frames_received: AtomicU64::new(0),
            frames_overwritten: AtomicU64::new(0),
            reconfigurations_rejected: AtomicU64::new(0),
        })
    }

    /// Handle for frame producers.
    pub fn frame_sink(self: &Arc<Self>) -> FrameSink {
        FrameSink {
            state: Arc::clone(self),
        }
    }

    /// Handle for parameter readers and writers.
    pub fn config_store(self: &Arc<Self>) -> ConfigStore {
        ConfigStore {
            state: Arc::clone(self),
        }
    }

    /// True once any frame has arrived.
    pub fn has_frame(&self) -> bool {
        self.inner.lock().frame.is_some()
    }

    /// Consume the pending flags and capture a snapshot.
    ///
    /// Returns `Some` if a new frame arrived or the parameters changed since
    /// the last call and a frame exists. Both flags are cleared together, so
    /// a frame and a reconfiguration arriving in the same tick trigger one
    /// cycle. A parameter change before the first frame stays pending.
    pub fn take_pending(&self) -> Option<Snapshot> {
        let mut inner = self.inner.lock();
        if !(inner.new_frame || inner.config_changed) {
            return None;
        }
        let frame = Arc::clone(inner.frame.as_ref()?);
        inner.new_frame = false;
        inner.config_changed = false;
        Some(Snapshot {
            frame,
            params: inner.params.clone(),
            received_at: inner.received_at,
        })
    }

    /// Total frames handed to the sink.
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Frames replaced before the scheduler consumed them.
    pub fn frames_overwritten(&self) -> u64 {
        self.frames_overwritten.load(Ordering::Relaxed)
    }

    /// Reconfiguration events that failed validation.
    pub fn reconfigurations_rejected(&self) -> u64 {
        self.reconfigurations_rejected.load(Ordering::Relaxed)
    }
}

/// Producer handle for point cloud frames.
#[derive(Debug, Clone)]
pub struct FrameSink {
    state: Arc<SharedState>,
}

impl FrameSink {
    /// Replace the current frame and mark it new.
    ///
    /// Latest value wins: an unconsumed earlier frame is dropped.
    pub fn on_frame(&self, frame: PointCloudFrame) {
        let points = frame.len();
        let frame = Arc::new(frame);
        let overwritten = {
            let mut inner = self.state.inner.lock();
            let overwritten = inner.new_frame;
            inner.frame = Some(frame);
            inner.received_at = Some(Instant::now());
            inner.new_frame = true;
            overwritten
        };

        self.state.frames_received.fetch_add(1, Ordering::Relaxed);
        if overwritten {
            self.state.frames_overwritten.fetch_add(1, Ordering::Relaxed);
            log::debug!("Unconsumed frame replaced by a newer one ({} points)", points);
        } else {
            log::trace!("Frame received ({} points)", points);
        }
    }
}

/// Reader/writer handle for grid parameters.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    state: Arc<SharedState>,
}

impl ConfigStore {
    /// Copy of the parameters currently in force.
    pub fn read(&self) -> GridParams {
        self.state.inner.lock().params.clone()
    }

    /// Replace all parameters at once and flag a resynthesis.
    ///
    /// Invalid parameters are rejected: the previous ones stay in force, no
    /// resynthesis is flagged, and the validation error is returned.
    pub fn apply(&self, update: GridParams) -> Result<()> {
        if let Err(e) = update.validate() {
            self.state
                .reconfigurations_rejected
                .fetch_add(1, Ordering::Relaxed);
            log::warn!("Reconfiguration rejected, keeping previous parameters: {}", e);
            return Err(e);
        }

        log::info!(
            "Reconfigured: frame={}, radius={}, deviation={:.4}, buffer={}, rate={}Hz, resolution={}",
            update.frame_id,
            update.search_radius,
            update.deviation,
            update.buffer,
            update.loop_rate,
            update.cell_resolution
        );
        let mut inner = self.state.inner.lock();
        inner.params = update;
        inner.config_changed = true;
        Ok(())
    }
}
