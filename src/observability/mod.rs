//! Observability: metrics and tracing.
//!
//! - **Metrics**: counters and gauges via `metrics-rs`
//! - **Tracing**: structured logging and spans via `tracing`
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `tiledma_frames_attached` | Counter | Frames bound to an engine |
//! | `tiledma_frames_detached` | Counter | Frames released |
//! | `tiledma_operation_failures` | Counter | Failed operations, by operation and error kind |
//! | `tiledma_folds_allocated` | Counter | Fold slots registered |
//! | `tiledma_tile_updates` | Counter | Per-tile ROI/offset updates |
//! | `tiledma_live_frames` | Gauge | Frames currently registered |
//! | `tiledma_engines_in_use` | Gauge | Busy engines, by direction |
//!
//! Nothing is exported unless the application installs a recorder.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tiledma::observability::init_metrics;
//!
//! init_metrics();
//! // install a metrics exporter (prometheus, statsd, ...) to collect them
//! ```

mod metrics;
mod tracing_support;

pub use metrics::{SessionMetrics, init_metrics};
pub use tracing_support::{span_session, trace_state_change};
