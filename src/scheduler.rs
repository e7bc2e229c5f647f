//! Fixed-rate synthesis loop.
//!
//! ```text
//!   AwaitingFirstFrame ──(first frame)──► Running
//! ```
//!
//! Each tick polls the shared mailbox without blocking. A cycle runs only
//! when a new frame arrived or the parameters changed; otherwise the tick is
//! idle. The tick period is re-read from the live parameters every tick, so a
//! reconfigured loop rate applies from the next tick on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::grid::{CycleReport, GridSynthesizer, Time};
use crate::io::publisher::GridPublisher;
use crate::state::{ConfigStore, SharedState};

/// Longest single sleep, bounding shutdown latency.
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Interval between status log lines.
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    AwaitingFirstFrame,
    Running,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No frame has arrived yet
    Waiting,
    /// Nothing changed since the last cycle
    Idle,
    /// A grid was synthesized and published
    Published(CycleReport),
    /// A grid was synthesized but the publisher failed
    PublishFailed(CycleReport),
    /// The frame needed a grid too large to build; nothing was published
    Skipped,
}

/// Counters for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub cycles: u64,
    pub publish_failures: u64,
    /// Triggered cycles refused before synthesis (oversized grid)
    pub skipped_cycles: u64,
}

/// Drives synthesis and publication.
pub struct Scheduler<P: GridPublisher> {
    shared: Arc<SharedState>,
    config: ConfigStore,
    synthesizer: GridSynthesizer,
    publisher: P,
    state: SchedulerState,
    seq: u64,
    stats: SchedulerStats,
    last_status: Instant,
    last_report: Option<CycleReport>,
}

impl<P: GridPublisher> Scheduler<P> {
    pub fn new(shared: Arc<SharedState>, synthesizer: GridSynthesizer, publisher: P) -> Self {
        Self {
            config: shared.config_store(),
            shared,
            synthesizer,
            publisher,
            state: SchedulerState::AwaitingFirstFrame,
            seq: 0,
            stats: SchedulerStats::default(),
            last_status: Instant::now(),
            last_report: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Sequence number of the last published cycle (0 before the first).
    pub fn last_seq(&self) -> u64 {
        self.seq
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Run one tick.
    pub fn tick(&mut self) -> TickOutcome {
        self.stats.ticks += 1;

        if self.state == SchedulerState::AwaitingFirstFrame {
            if !self.shared.has_frame() {
                return TickOutcome::Waiting;
            }
            log::info!("First frame received, starting grid synthesis");
            self.state = SchedulerState::Running;
        }

        let Some(snapshot) = self.shared.take_pending() else {
            return TickOutcome::Idle;
        };

        let seq = self.seq + 1;
        let output = match self.synthesizer.synthesize(&snapshot, seq, Time::now()) {
            Ok(output) => output,
            Err(e) => {
                self.stats.skipped_cycles += 1;
                log::warn!("Skipping frame of {} points: {}", snapshot.frame.len(), e);
                return TickOutcome::Skipped;
            }
        };
        self.seq = seq;
        self.stats.cycles += 1;
        let report = output.report;
        self.last_report = Some(report.clone());

        match self.publisher.publish(&output.message) {
            Ok(()) => TickOutcome::Published(report),
            Err(e) => {
                self.stats.publish_failures += 1;
                log::warn!("Failed to publish grid {}: {}", report.seq, e);
                TickOutcome::PublishFailed(report)
            }
        }
    }

    /// Tick at the configured loop rate until `running` clears.
    pub fn run(&mut self, running: &AtomicBool) {
        log::info!("Scheduler started");

        while running.load(Ordering::Relaxed) {
            let tick_start = Instant::now();
            self.tick();

            if self.last_status.elapsed() >= STATUS_INTERVAL {
                self.log_status();
                self.last_status = Instant::now();
            }

            // An overrunning tick is followed immediately by the next one
            let period = self.config.read().tick_period();
            let deadline = tick_start.checked_add(period);
            while running.load(Ordering::Relaxed) {
                let now = Instant::now();
                let remaining = match deadline {
                    Some(d) if d > now => d - now,
                    Some(_) => break,
                    None => MAX_SLEEP_SLICE,
                };
                thread::sleep(remaining.min(MAX_SLEEP_SLICE));
            }
        }

        log::info!(
            "Scheduler stopped ({} ticks, {} cycles, {} publish failures, {} skipped)",
            self.stats.ticks,
            self.stats.cycles,
            self.stats.publish_failures,
            self.stats.skipped_cycles
        );
    }

    fn log_status(&self) {
        match (&self.state, &self.last_report) {
            (SchedulerState::AwaitingFirstFrame, _) => {
                log::info!("Waiting for first frame");
            }
            (SchedulerState::Running, Some(r)) => {
                log::info!(
                    "Grid {}: {} points, {}x{} cells, {} occupied | normals {:.1}ms, grid {:.1}ms | {} cycles, {} frames overwritten, {} publish failures, {} skipped",
                    r.seq,
                    r.points,
                    r.width,
                    r.height,
                    r.occupied_cells,
                    r.normals_ms,
                    r.grid_ms,
                    self.stats.cycles,
                    self.shared.frames_overwritten(),
                    self.stats.publish_failures,
                    self.stats.skipped_cycles
                );
            }
            (SchedulerState::Running, None) => {
                log::info!(
                    "No grid published yet ({} frames skipped)",
                    self.stats.skipped_cycles
                );
            }
        }
    }
}
