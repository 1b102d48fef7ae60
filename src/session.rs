//! Session lifecycle: one resource manager per pipeline invocation.
//!
//! A [`Session`] owns the frame registry, the engine pool and the fold table.
//! All three are sized once from [`SessionConfig`] and dropped together on
//! [`Session::teardown`]. Every failing operation reports to the session's
//! [`DiagnosticSink`] before returning the error.
//!
//! `Session` takes `&mut self` for every claim, so a single owner needs no
//! locking. Cooperating threads share a session through [`SharedSession`],
//! whose [`ResourceGuard`] serializes claims and keeps multi-step per-tile
//! updates atomic.
//!
//! # Lifecycle
//!
//! ```text
//! create ──► Created ──attach──► Active ──teardown──► TornDown
//!               └──────────────teardown─────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use tiledma::prelude::*;
//!
//! let mut session = Session::create(SessionConfig::new(4))?;
//! let frame = FrameDescriptor::new(0x1000, PixelFormat::Nv12, Direction::Read, 64, 64);
//! session.attach(&frame)?;
//!
//! let fold = session.set_fold_storage(0x8000, RegionHandles::default())?;
//! session.link_storage(0x1000, fold)?;
//! let params = session.update_tile(fold, Roi::new(0, 0, 32, 16), 0)?;
//! assert_eq!(params.roi.width, 32);
//!
//! session.detach(0x1000)?;
//! session.teardown()?;
//! # Ok::<(), tiledma::Error>(())
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;

use tracing::{Span, debug, trace, warn};

use crate::addr::{AddressTranslator, IdentityTranslator};
use crate::align::{Alignment, AlignmentTable, DefaultAlignmentTable, alignment_of, validate};
use crate::config::SessionConfig;
use crate::diag::{DiagnosticSink, TracingSink};
use crate::engine::{EngineId, EnginePool, TransferHandle};
use crate::error::{Error, Result};
use crate::fold::{FoldId, FoldTable, RegionHandles, RegionParams, Roi, TransferParams};
use crate::format::{Direction, PixelFormat, Plane};
use crate::frame::{FoldGeometry, FrameDescriptor, FrameEntry, FrameId, FrameRegistry, ResourceFrame};
use crate::observability::{SessionMetrics, init_metrics, span_session, trace_state_change};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// State
// =============================================================================

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Pools allocated, no frame attached yet.
    #[default]
    Created,
    /// At least one frame has been attached.
    Active,
    /// Pools released. Terminal.
    TornDown,
}

impl SessionState {
    /// Lowercase state name.
    pub fn name(self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Active => "active",
            SessionState::TornDown => "torn down",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames currently attached.
    pub live_frames: usize,
    /// Frame table capacity.
    pub frame_capacity: usize,
    /// Fold slots allocated so far.
    pub folds_allocated: usize,
    /// Fold slots linked to a frame.
    pub folds_in_use: usize,
    /// Fold table capacity.
    pub fold_capacity: usize,
    /// Busy read engines.
    pub read_engines_in_use: usize,
    /// Busy write engines.
    pub write_engines_in_use: usize,
    /// Total read engines.
    pub read_engines: usize,
    /// Total write engines.
    pub write_engines: usize,
}

// =============================================================================
// Pools
// =============================================================================

struct Pools {
    frames: FrameRegistry,
    engines: EnginePool,
    folds: FoldTable,
}

impl Pools {
    fn new(config: &SessionConfig) -> Result<Self> {
        Ok(Self {
            frames: FrameRegistry::with_capacity(config.frame_capacity)?,
            engines: EnginePool::from_config(config)?,
            folds: FoldTable::with_capacity(config.fold_capacity())?,
        })
    }

    fn entry(&self, addr: usize) -> Result<&FrameEntry> {
        let id = self.frames.require(addr)?;
        self.frames.entry(id).ok_or(Error::NotFound { addr })
    }

    fn resource(&self, addr: usize) -> Result<&ResourceFrame> {
        let id = self.frames.require(addr)?;
        self.frames.resource(id).ok_or(Error::NotFound { addr })
    }

    fn resource_mut(&mut self, addr: usize) -> Result<&mut ResourceFrame> {
        let id = self.frames.require(addr)?;
        self.frames.resource_mut(id).ok_or(Error::NotFound { addr })
    }

    fn fold_at(&self, virt: usize) -> Result<FoldId> {
        self.folds.find_by_addr(virt).ok_or_else(|| {
            Error::InvalidFoldReference(format!("no staging buffer at {virt:#x}"))
        })
    }

    /// Alignment of the frame linked to `fold`.
    fn fold_alignment(&self, fold: FoldId, table: &dyn AlignmentTable) -> Result<Alignment> {
        let frame = self
            .folds
            .slot(fold)?
            .frame()
            .ok_or_else(|| Error::MissingLinkage(format!("{fold} is not linked to a frame")))?;
        let resource = self
            .frames
            .resource(frame)
            .ok_or_else(|| Error::MissingLinkage(format!("{fold} links detached {frame}")))?;
        Ok(alignment_of(table, resource.format))
    }

    fn set_roi(&mut self, fold: FoldId, roi: Roi, platform: &Platform) -> Result<()> {
        let align = self.fold_alignment(fold, platform.alignment.as_ref())?;
        self.folds.set_roi(fold, roi, align)?;
        platform.metrics.record_tile_update();
        trace!(fold = %fold, x = roi.x, y = roi.y, width = roi.width, height = roi.height, "roi set");
        Ok(())
    }

    fn stats(&self) -> SessionStats {
        SessionStats {
            live_frames: self.frames.len(),
            frame_capacity: self.frames.capacity(),
            folds_allocated: self.folds.len(),
            folds_in_use: self.folds.in_use(),
            fold_capacity: self.folds.capacity(),
            read_engines_in_use: self.engines.in_use(Direction::Read),
            write_engines_in_use: self.engines.in_use(Direction::Write),
            read_engines: self.engines.capacity(Direction::Read),
            write_engines: self.engines.capacity(Direction::Write),
        }
    }

    fn record_occupancy(&self, metrics: &SessionMetrics) {
        metrics.record_occupancy(
            self.frames.len(),
            self.engines.in_use(Direction::Read),
            self.engines.in_use(Direction::Write),
        );
    }
}

/// Platform services consulted by pool operations.
struct Platform {
    alignment: Box<dyn AlignmentTable>,
    translator: Box<dyn AddressTranslator>,
    metrics: SessionMetrics,
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for a [`Session`] with custom platform services.
///
/// ```rust
/// use std::sync::Arc;
/// use tiledma::addr::OffsetTranslator;
/// use tiledma::diag::MemorySink;
/// use tiledma::prelude::*;
///
/// let sink = Arc::new(MemorySink::new());
/// let session = Session::builder(SessionConfig::default())
///     .translator(OffsetTranslator::new(0x1000_0000, 0x8000_0000))
///     .sink(sink.clone())
///     .build()?;
/// assert_eq!(session.state(), SessionState::Created);
/// # Ok::<(), tiledma::Error>(())
/// ```
pub struct SessionBuilder {
    config: SessionConfig,
    alignment: Option<Box<dyn AlignmentTable>>,
    translator: Option<Box<dyn AddressTranslator>>,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl SessionBuilder {
    fn new(config: SessionConfig) -> Self {
        Self {
            config,
            alignment: None,
            translator: None,
            sink: None,
        }
    }

    /// Use a platform alignment table instead of [`DefaultAlignmentTable`].
    pub fn alignment(mut self, table: impl AlignmentTable + 'static) -> Self {
        self.alignment = Some(Box::new(table));
        self
    }

    /// Use a platform address translator instead of [`IdentityTranslator`].
    pub fn translator(mut self, translator: impl AddressTranslator + 'static) -> Self {
        self.translator = Some(Box::new(translator));
        self
    }

    /// Send failure reports to `sink` instead of [`TracingSink`].
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the configuration and allocate every pool.
    ///
    /// Fails with `AllocationFailed` if any pool cannot be backed. The failure
    /// is reported to the sink like any other.
    pub fn build(self) -> Result<Session> {
        init_metrics();
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        let metrics = SessionMetrics::new(id);
        let span = span_session(id);
        let entered = span.enter();

        let pools = match self.config.validate().and_then(|()| Pools::new(&self.config)) {
            Ok(pools) => pools,
            Err(err) => {
                sink.report("create", &err.to_string());
                metrics.record_failure("create", err.kind());
                return Err(err);
            }
        };

        debug!(
            frames = self.config.frame_capacity,
            contexts = self.config.hw_contexts,
            read_engines = self.config.read_engines(),
            write_engines = self.config.write_engines(),
            folds = self.config.fold_capacity(),
            "session created"
        );

        drop(entered);
        Ok(Session {
            id,
            config: self.config,
            state: SessionState::Created,
            pools: Some(pools),
            platform: Platform {
                alignment: self
                    .alignment
                    .unwrap_or_else(|| Box::new(DefaultAlignmentTable)),
                translator: self
                    .translator
                    .unwrap_or_else(|| Box::new(IdentityTranslator)),
                metrics,
            },
            sink,
            span,
        })
    }
}

// =============================================================================
// Session
// =============================================================================

/// Owner of every DMA resource used by one pipeline invocation.
pub struct Session {
    id: u64,
    config: SessionConfig,
    state: SessionState,
    pools: Option<Pools>,
    platform: Platform,
    sink: Arc<dyn DiagnosticSink>,
    span: Span,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session with the default platform services.
    pub fn create(config: SessionConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Start building a session with custom platform services.
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    /// Process-unique session id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Configuration the pools were sized from.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Software thread hint.
    pub fn threads(&self) -> usize {
        self.config.threads
    }

    // -------------------------------------------------------------------------
    // Plumbing
    // -------------------------------------------------------------------------

    fn fail(&self, op: &'static str, err: Error) -> Error {
        self.sink.report(op, &err.to_string());
        self.platform.metrics.record_failure(op, err.kind());
        err
    }

    fn with_pools<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut Pools, &Platform) -> Result<T>,
    ) -> Result<T> {
        let span = self.span.clone();
        let _guard = span.enter();
        let result = match self.pools.as_mut() {
            Some(pools) => f(pools, &self.platform),
            None => Err(Error::SessionClosed),
        };
        result.map_err(|err| self.fail(op, err))
    }

    fn read_pools<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&Pools, &Platform) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.span.enter();
        let result = match self.pools.as_ref() {
            Some(pools) => f(pools, &self.platform),
            None => Err(Error::SessionClosed),
        };
        result.map_err(|err| self.fail(op, err))
    }

    fn transition(&mut self, to: SessionState) {
        trace_state_change(self.id, self.state.name(), to.name());
        self.state = to;
    }

    // -------------------------------------------------------------------------
    // Frame lifecycle
    // -------------------------------------------------------------------------

    /// Attach a frame: check the full frame against the format alignment, then
    /// bind it to an engine.
    pub fn attach(&mut self, desc: &FrameDescriptor) -> Result<FrameId> {
        let id = self.with_pools("attach", |pools, platform| {
            validate(
                platform.alignment.as_ref(),
                desc.format,
                0,
                0,
                desc.width,
                desc.height,
            )?;
            let id = pools.frames.register(&mut pools.engines, desc)?;
            platform.metrics.record_attach(desc.direction);
            pools.record_occupancy(&platform.metrics);
            if let Some(entry) = pools.frames.entry(id) {
                debug!(
                    frame = %format_args!("{:#x}", desc.addr),
                    id = %id,
                    engine = %entry.engine,
                    format = %desc.format,
                    "frame attached"
                );
            }
            Ok(id)
        })?;

        if self.state == SessionState::Created {
            self.transition(SessionState::Active);
        }
        Ok(id)
    }

    /// Attach a frame described by raw runtime codes.
    ///
    /// `format` must be a known pixel format code; a zero `direction` means
    /// read, anything else write.
    #[allow(clippy::too_many_arguments)]
    pub fn attach_raw(
        &mut self,
        addr: usize,
        format: i32,
        direction: i32,
        width: u32,
        height: u32,
        stride: u32,
        is_last: bool,
    ) -> Result<FrameId> {
        if self.pools.is_none() {
            return Err(self.fail("attach", Error::SessionClosed));
        }
        let format = PixelFormat::from_code(format).map_err(|err| self.fail("attach", err))?;
        let desc = FrameDescriptor::new(addr, format, Direction::from_code(direction), width, height)
            .with_stride(stride)
            .last(is_last);
        self.attach(&desc)
    }

    /// Detach a frame, releasing its engine and unlinking its fold.
    ///
    /// The fold slot stays allocated for reuse.
    pub fn detach(&mut self, addr: usize) -> Result<FrameId> {
        self.with_pools("detach", |pools, platform| {
            let id = pools
                .frames
                .unregister(&mut pools.engines, &mut pools.folds, addr)?;
            platform.metrics.record_detach();
            pools.record_occupancy(&platform.metrics);
            debug!(frame = %format_args!("{:#x}", addr), id = %id, "frame detached");
            Ok(id)
        })
    }

    /// Release every pool. Later calls, including a second teardown, fail
    /// with `SessionClosed`.
    ///
    /// Returns the staging memory that was registered, which the caller
    /// still owns and must free.
    pub fn teardown(&mut self) -> Result<Vec<RegionParams>> {
        let span = self.span.clone();
        let _guard = span.enter();

        let Some(pools) = self.pools.take() else {
            return Err(self.fail("teardown", Error::SessionClosed));
        };
        if !pools.frames.is_empty() {
            warn!(live = pools.frames.len(), "tearing down with frames attached");
        }
        let regions = pools.folds.regions().collect();
        drop(pools);

        self.platform.metrics.record_occupancy(0, 0, 0);
        self.transition(SessionState::TornDown);
        debug!("session torn down");
        Ok(regions)
    }

    // -------------------------------------------------------------------------
    // Per-frame queries and options
    // -------------------------------------------------------------------------

    /// Table index of the frame at `addr`.
    pub fn frame_index(&self, addr: usize) -> Result<FrameId> {
        self.read_pools("frame_index", |pools, _| pools.frames.require(addr))
    }

    /// Engine serving the frame at `addr`.
    pub fn engine_of(&self, addr: usize) -> Result<EngineId> {
        self.read_pools("engine_of", |pools, _| Ok(pools.entry(addr)?.engine))
    }

    /// Pad 8-bit samples to 16 bits in local memory.
    pub fn set_padding(&mut self, addr: usize, padding: bool) -> Result<()> {
        self.with_pools("set_padding", |pools, _| {
            pools.resource_mut(addr)?.padding = padding;
            Ok(())
        })
    }

    /// Select which planes of the frame are transferred.
    pub fn set_component(&mut self, addr: usize, plane: Plane) -> Result<()> {
        self.with_pools("set_component", |pools, _| {
            pools.resource_mut(addr)?.plane = plane;
            Ok(())
        })
    }

    /// Number of planes transferred for the frame.
    pub fn num_components(&self, addr: usize) -> Result<u32> {
        self.read_pools("num_components", |pools, _| {
            Ok(pools.resource(addr)?.plane.components())
        })
    }

    /// Record the software thread hint.
    pub fn set_parallel(&mut self, threads: usize) -> Result<()> {
        self.with_pools("set_parallel", |_, _| Ok(()))?;
        self.config.threads = threads;
        Ok(())
    }

    /// Record the fold geometry for a frame and size its fold buffer.
    ///
    /// Returns the fold buffer size in bytes.
    pub fn set_max_fold_storage(&mut self, addr: usize, geometry: FoldGeometry) -> Result<usize> {
        self.with_pools("set_max_fold_storage", |pools, _| {
            let resource = pools.resource_mut(addr)?;
            resource.set_fold_geometry(geometry)?;
            Ok(resource.fold_buffer_size)
        })
    }

    /// Fold buffer size of the frame in bytes.
    pub fn fold_size(&self, addr: usize) -> Result<usize> {
        self.read_pools("fold_size", |pools, _| {
            Ok(pools.resource(addr)?.fold_buffer_size)
        })
    }

    /// Whether the frame is read from host memory.
    pub fn is_read(&self, addr: usize) -> Result<bool> {
        self.read_pools("is_read", |pools, _| {
            Ok(pools.entry(addr)?.direction.is_read())
        })
    }

    /// Whether the frame was attached as the session's last.
    pub fn is_last_frame(&self, addr: usize) -> Result<bool> {
        self.read_pools("is_last_frame", |pools, _| {
            Ok(pools.resource(addr)?.is_last)
        })
    }

    /// Whether the frame's engine still needs a transfer-session handle.
    pub fn needs_transfer_handle(&self, addr: usize) -> Result<bool> {
        self.read_pools("needs_transfer_handle", |pools, _| {
            Ok(transfer_handle_of(pools, addr)?.is_none())
        })
    }

    /// Attach the descriptor layer's transfer-session handle to the frame's engine.
    pub fn set_transfer_handle(&mut self, addr: usize, handle: TransferHandle) -> Result<()> {
        self.with_pools("set_transfer_handle", |pools, _| {
            let engine = pools.entry(addr)?.engine;
            pools.engines.set_handle(engine, handle);
            Ok(())
        })
    }

    /// Transfer-session handle of the frame's engine.
    pub fn transfer_handle(&self, addr: usize) -> Result<Option<TransferHandle>> {
        self.read_pools("transfer_handle", |pools, _| transfer_handle_of(pools, addr))
    }

    // -------------------------------------------------------------------------
    // Fold storage
    // -------------------------------------------------------------------------

    /// Register a staging buffer the caller has mapped at `virt`.
    pub fn set_fold_storage(&mut self, virt: usize, regions: RegionHandles) -> Result<FoldId> {
        self.with_pools("set_fold_storage", |pools, platform| {
            let phys = platform.translator.physical_address_of(virt);
            let fold = pools.folds.allocate(virt, phys, regions)?;
            platform.metrics.record_fold_allocated();
            debug!(
                fold = %fold,
                virt = %format_args!("{:#x}", virt),
                phys = %format_args!("{:#x}", phys),
                "fold storage registered"
            );
            Ok(fold)
        })
    }

    /// An allocated fold slot no frame is linked to.
    pub fn find_free_fold(&self) -> Result<Option<FoldId>> {
        self.read_pools("find_free_fold", |pools, _| Ok(pools.folds.find_free()))
    }

    /// Link a fold slot to the frame at `addr` on behalf of the calling thread.
    ///
    /// A fold previously linked to the frame is unlinked.
    pub fn link_storage(&mut self, addr: usize, fold: FoldId) -> Result<()> {
        self.with_pools("link_storage", |pools, _| {
            let frame = pools.frames.require(addr)?;
            let previous = pools.frames.entry(frame).and_then(|e| e.fold);
            pools.folds.link(fold, frame, thread::current().id())?;
            if let Some(previous) = previous.filter(|p| *p != fold) {
                pools.folds.unlink(previous)?;
            }
            pools.frames.set_fold(frame, fold);
            debug!(frame = %format_args!("{:#x}", addr), fold = %fold, "fold linked");
            Ok(())
        })
    }

    /// Fold slot linked to the frame at `addr`.
    pub fn fold_of(&self, addr: usize) -> Result<Option<FoldId>> {
        self.read_pools("fold_of", |pools, _| Ok(pools.entry(addr)?.fold))
    }

    /// Set a tile's region of interest, checked against the linked frame's format.
    ///
    /// A rejected region leaves the slot untouched.
    pub fn set_roi(&mut self, fold: FoldId, roi: Roi) -> Result<()> {
        self.with_pools("set_roi", |pools, platform| pools.set_roi(fold, roi, platform))
    }

    /// Select the active fold within the staging buffer.
    pub fn set_offset(&mut self, fold: FoldId, offset: usize) -> Result<()> {
        self.with_pools("set_offset", |pools, platform| {
            pools.folds.set_offset(fold, offset)?;
            platform.metrics.record_tile_update();
            Ok(())
        })
    }

    /// Set the chroma plane offset within a fold.
    pub fn set_chroma_offset(&mut self, fold: FoldId, offset: usize) -> Result<()> {
        self.with_pools("set_chroma_offset", |pools, _| {
            pools.folds.set_chroma_offset(fold, offset)
        })
    }

    /// [`set_roi`](Self::set_roi) for the fold registered at staging address `virt`.
    pub fn set_host_roi(&mut self, virt: usize, roi: Roi) -> Result<()> {
        self.with_pools("set_host_roi", |pools, platform| {
            let fold = pools.fold_at(virt)?;
            pools.set_roi(fold, roi, platform)
        })
    }

    /// [`set_offset`](Self::set_offset) for the fold registered at staging address `virt`.
    pub fn set_storage_offset(&mut self, virt: usize, offset: usize) -> Result<()> {
        self.with_pools("set_storage_offset", |pools, platform| {
            let fold = pools.fold_at(virt)?;
            pools.folds.set_offset(fold, offset)?;
            platform.metrics.record_tile_update();
            Ok(())
        })
    }

    /// Set region and offset for the next tile and return its transfer parameters.
    pub fn update_tile(&mut self, fold: FoldId, roi: Roi, offset: usize) -> Result<TransferParams> {
        self.with_pools("update_tile", |pools, platform| {
            pools.set_roi(fold, roi, platform)?;
            pools.folds.set_offset(fold, offset)?;
            pools.folds.transfer_params(fold)
        })
    }

    /// Parameters for the next transfer through `fold`.
    pub fn transfer_params(&self, fold: FoldId) -> Result<TransferParams> {
        self.read_pools("transfer_params", |pools, _| pools.folds.transfer_params(fold))
    }

    /// [`transfer_params`](Self::transfer_params) for the fold at staging address `virt`.
    pub fn transfer_params_at(&self, virt: usize) -> Result<TransferParams> {
        self.read_pools("transfer_params", |pools, _| {
            pools.folds.transfer_params(pools.fold_at(virt)?)
        })
    }

    /// Staging memory registered at `virt`.
    pub fn region_params(&self, virt: usize) -> Result<RegionParams> {
        self.read_pools("region_params", |pools, _| {
            pools.folds.region_params(pools.fold_at(virt)?)
        })
    }

    /// Forget every fold slot. Fails while any slot is linked to a frame.
    pub fn reset_folds(&mut self) -> Result<()> {
        self.with_pools("reset_folds", |pools, _| {
            if pools.folds.in_use() > 0 {
                return Err(Error::InvalidState {
                    expected: "all folds unlinked",
                    actual: "folds linked",
                });
            }
            pools.folds.reset();
            debug!("fold table reset");
            Ok(())
        })
    }

    /// Pool occupancy.
    pub fn stats(&self) -> Result<SessionStats> {
        self.read_pools("stats", |pools, _| Ok(pools.stats()))
    }
}

fn transfer_handle_of(pools: &Pools, addr: usize) -> Result<Option<TransferHandle>> {
    let engine = pools.entry(addr)?.engine;
    Ok(pools.engines.engine(engine).and_then(|e| e.handle()))
}

// =============================================================================
// Shared access
// =============================================================================

/// A session shared between cooperating threads.
///
/// Every claim goes through [`lock`](Self::lock), so two threads can never
/// pick the same free engine or fold slot.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<Session>>,
}

impl fmt::Debug for SharedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSession").finish_non_exhaustive()
    }
}

impl SharedSession {
    /// Share an existing session.
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Create and share a session with default platform services.
    pub fn create(config: SessionConfig) -> Result<Self> {
        Session::create(config).map(Self::new)
    }

    /// Take the resource lock, blocking until it is free.
    pub fn lock(&self) -> Result<ResourceGuard<'_>> {
        self.inner
            .lock()
            .map(|session| ResourceGuard { session })
            .map_err(|_| Error::LockPoisoned)
    }

    /// Take the resource lock if it is free right now.
    pub fn try_lock(&self) -> Result<Option<ResourceGuard<'_>>> {
        match self.inner.try_lock() {
            Ok(session) => Ok(Some(ResourceGuard { session })),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Poisoned(_)) => Err(Error::LockPoisoned),
        }
    }

    /// Attach a frame under the lock.
    pub fn attach(&self, desc: &FrameDescriptor) -> Result<FrameId> {
        self.lock()?.attach(desc)
    }

    /// Detach a frame under the lock.
    pub fn detach(&self, addr: usize) -> Result<FrameId> {
        self.lock()?.detach(addr)
    }

    /// Tear the session down under the lock.
    pub fn teardown(&self) -> Result<Vec<RegionParams>> {
        self.lock()?.teardown()
    }
}

/// Exclusive access to a shared session. Released on drop.
pub struct ResourceGuard<'a> {
    session: MutexGuard<'a, Session>,
}

impl Deref for ResourceGuard<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for ResourceGuard<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}
