//! # tiledma
//!
//! DMA resource management for tiled image-processing pipelines.
//!
//! A pipeline moves frames between host memory and a small local staging
//! memory one tile at a time. tiledma owns the scarce resources involved:
//! hardware contexts, the transfer engines inside them, and the fold slots
//! (staging buffers) tiles pass through. It does not submit transfers itself;
//! it hands the descriptor layer everything needed to program one.
//!
//! ## Features
//!
//! - **Bounded pools**: every table is sized once at session creation
//! - **Deterministic claims**: lowest free context, lowest free engine
//! - **Fold reuse**: detached frames leave their staging buffers allocated
//! - **Alignment checks**: regions are checked against a platform table
//! - **Shared sessions**: a real resource lock for cooperating threads
//!
//! ## Quick Start
//!
//! ```rust
//! use tiledma::prelude::*;
//!
//! let mut session = Session::create(SessionConfig::new(4))?;
//!
//! let frame = FrameDescriptor::new(0x1000, PixelFormat::Nv12, Direction::Read, 256, 64);
//! session.attach(&frame)?;
//! session.set_component(0x1000, Plane::Luma)?;
//!
//! let fold = match session.find_free_fold()? {
//!     Some(fold) => fold,
//!     None => session.set_fold_storage(0x8000_0000, RegionHandles::default())?,
//! };
//! session.link_storage(0x1000, fold)?;
//!
//! for x in (0..256).step_by(64) {
//!     let params = session.update_tile(fold, Roi::new(x, 0, 64, 64), 0)?;
//!     assert_eq!(params.roi.x, x);
//! }
//!
//! session.detach(0x1000)?;
//! session.teardown()?;
//! # Ok::<(), tiledma::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod addr;
pub mod align;
pub mod config;
pub mod diag;
pub mod engine;
pub mod error;
pub mod fold;
pub mod format;
pub mod frame;
pub mod observability;
pub mod session;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::SessionConfig;
    pub use crate::engine::{EngineId, TransferHandle};
    pub use crate::error::{Error, Result};
    pub use crate::fold::{FoldId, RegionHandles, RegionParams, Roi, TransferParams};
    pub use crate::format::{Direction, PixelFormat, Plane};
    pub use crate::frame::{FoldGeometry, FrameDescriptor, FrameId};
    pub use crate::session::{ResourceGuard, Session, SessionState, SessionStats, SharedSession};
}

pub use error::{Error, Result};
