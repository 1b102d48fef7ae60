//! Metrics collection using metrics-rs.

use metrics::{Counter, Gauge, Unit, counter, gauge};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::format::Direction;

/// Whether metrics have been described.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const FRAMES_ATTACHED: &str = "tiledma_frames_attached";
const FRAMES_DETACHED: &str = "tiledma_frames_detached";
const OPERATION_FAILURES: &str = "tiledma_operation_failures";
const FOLDS_ALLOCATED: &str = "tiledma_folds_allocated";
const TILE_UPDATES: &str = "tiledma_tile_updates";
const LIVE_FRAMES: &str = "tiledma_live_frames";
const ENGINES_IN_USE: &str = "tiledma_engines_in_use";

/// Describe all metrics.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        FRAMES_ATTACHED,
        Unit::Count,
        "Frames bound to a transfer engine"
    );
    metrics::describe_counter!(FRAMES_DETACHED, Unit::Count, "Frames released");
    metrics::describe_counter!(
        OPERATION_FAILURES,
        Unit::Count,
        "Failed operations by operation and error kind"
    );
    metrics::describe_counter!(FOLDS_ALLOCATED, Unit::Count, "Fold slots registered");
    metrics::describe_counter!(
        TILE_UPDATES,
        Unit::Count,
        "Region of interest and offset updates"
    );
    metrics::describe_gauge!(LIVE_FRAMES, Unit::Count, "Frames currently registered");
    metrics::describe_gauge!(
        ENGINES_IN_USE,
        Unit::Count,
        "Transfer engines bound to a frame"
    );
}

/// Pre-labelled metric handles for one session.
#[derive(Clone)]
pub struct SessionMetrics {
    session: String,
    attached_read: Counter,
    attached_write: Counter,
    detached: Counter,
    folds_allocated: Counter,
    tile_updates: Counter,
    live_frames: Gauge,
    read_engines: Gauge,
    write_engines: Gauge,
}

impl SessionMetrics {
    /// Create handles labelled with `session`.
    pub fn new(session: u64) -> Self {
        let session = session.to_string();
        Self {
            attached_read: counter!(FRAMES_ATTACHED, "session" => session.clone(), "direction" => "read"),
            attached_write: counter!(FRAMES_ATTACHED, "session" => session.clone(), "direction" => "write"),
            detached: counter!(FRAMES_DETACHED, "session" => session.clone()),
            folds_allocated: counter!(FOLDS_ALLOCATED, "session" => session.clone()),
            tile_updates: counter!(TILE_UPDATES, "session" => session.clone()),
            live_frames: gauge!(LIVE_FRAMES, "session" => session.clone()),
            read_engines: gauge!(ENGINES_IN_USE, "session" => session.clone(), "direction" => "read"),
            write_engines: gauge!(ENGINES_IN_USE, "session" => session.clone(), "direction" => "write"),
            session,
        }
    }

    /// Record a frame attach.
    #[inline]
    pub fn record_attach(&self, direction: Direction) {
        match direction {
            Direction::Read => self.attached_read.increment(1),
            Direction::Write => self.attached_write.increment(1),
        }
    }

    /// Record a frame detach.
    #[inline]
    pub fn record_detach(&self) {
        self.detached.increment(1);
    }

    /// Record a fold slot allocation.
    #[inline]
    pub fn record_fold_allocated(&self) {
        self.folds_allocated.increment(1);
    }

    /// Record a per-tile update.
    #[inline]
    pub fn record_tile_update(&self) {
        self.tile_updates.increment(1);
    }

    /// Record current pool occupancy.
    #[inline]
    pub fn record_occupancy(&self, live_frames: usize, read_engines: usize, write_engines: usize) {
        self.live_frames.set(live_frames as f64);
        self.read_engines.set(read_engines as f64);
        self.write_engines.set(write_engines as f64);
    }

    /// Record a failed operation.
    #[inline]
    pub fn record_failure(&self, operation: &'static str, kind: &'static str) {
        counter!(
            OPERATION_FAILURES,
            "session" => self.session.clone(),
            "operation" => operation,
            "kind" => kind
        )
        .increment(1);
    }

    /// Session label.
    pub fn session(&self) -> &str {
        &self.session
    }
}
