//! Frame registry: host buffers currently bound to engines.
//!
//! The registry keeps two parallel arrays sized to the session's frame
//! capacity. The frame table maps a host address to the engine and fold
//! serving it. The resource array holds the frame's geometry and transfer
//! options. Entries are addressed by [`FrameId`]; engines and folds refer
//! back to frames by id only, and every id is dropped when the frame is
//! unregistered.

use std::fmt;

use crate::engine::{EngineId, EnginePool};
use crate::error::{Error, Result};
use crate::fold::{FoldId, FoldTable};
use crate::format::{DmaFormat, Direction, PixelFormat, Plane};

/// Index of a frame-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(usize);

impl FrameId {
    /// Wrap a raw table index.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw table index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame{}", self.0)
    }
}

/// What the pipeline knows about a frame when it attaches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDescriptor {
    /// Host virtual address; the registry key.
    pub addr: usize,
    /// Pixel format.
    pub format: PixelFormat,
    /// Transfer direction.
    pub direction: Direction,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row stride in pixels.
    pub stride: u32,
    /// Whether this is the session's last frame.
    pub is_last: bool,
}

impl FrameDescriptor {
    /// Describe a tightly packed frame (stride equals width).
    pub fn new(
        addr: usize,
        format: PixelFormat,
        direction: Direction,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            addr,
            format,
            direction,
            width,
            height,
            stride: width,
            is_last: false,
        }
    }

    /// Set the row stride.
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }

    /// Mark as the session's last frame.
    pub fn last(mut self, is_last: bool) -> Self {
        self.is_last = is_last;
        self
    }
}

/// Frame-table entry: where a frame's traffic is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEntry {
    /// Host virtual address.
    pub addr: usize,
    /// Engine serving the frame; carries the hardware context.
    pub engine: EngineId,
    /// Linked fold slot.
    pub fold: Option<FoldId>,
    /// Transfer direction.
    pub direction: Direction,
    /// Position in the table.
    pub id: FrameId,
}

/// Staging geometry requested for a frame's folds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FoldGeometry {
    /// Fold width in pixels.
    pub width: u32,
    /// Fold height in pixels.
    pub height: u32,
    /// Fold stride in pixels.
    pub stride: u32,
    /// Number of folds in the circular buffer.
    pub count: u32,
}

/// Geometry and options of a registered frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row stride in pixels.
    pub stride: u32,
    /// Pixel format.
    pub format: PixelFormat,
    /// Pad 8-bit samples to 16 bits in local memory.
    pub padding: bool,
    /// Planes to transfer.
    pub plane: Plane,
    /// Last frame of the session.
    pub is_last: bool,
    /// Fold geometry, once set.
    pub fold_geometry: Option<FoldGeometry>,
    /// Bytes needed for all folds of this frame.
    pub fold_buffer_size: usize,
    /// Linked fold slot.
    pub fold: Option<FoldId>,
}

impl ResourceFrame {
    fn from_descriptor(desc: &FrameDescriptor) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            stride: desc.stride,
            format: desc.format,
            is_last: desc.is_last,
            ..Default::default()
        }
    }

    /// Engine format of the luma plane.
    pub fn luma(&self) -> DmaFormat {
        self.format.luma()
    }

    /// Engine format of the chroma plane.
    pub fn chroma(&self) -> DmaFormat {
        self.format.chroma()
    }

    /// Record fold geometry and size the fold buffer from it.
    ///
    /// A geometry whose size overflows is rejected and leaves the frame unchanged.
    pub fn set_fold_geometry(&mut self, geometry: FoldGeometry) -> Result<()> {
        let pad = if self.padding { 2 } else { 1 };
        let bytes = (geometry.height as usize)
            .checked_mul(geometry.stride as usize)
            .and_then(|b| b.checked_mul(geometry.count as usize))
            .and_then(|b| b.checked_mul(pad))
            .ok_or(Error::FoldSizeOverflow {
                height: geometry.height,
                stride: geometry.stride,
                count: geometry.count,
            })?;
        self.fold_buffer_size = self.format.scale_size(bytes);
        self.fold_geometry = Some(geometry);
        Ok(())
    }
}

/// Registered frames of one session.
#[derive(Debug, Clone)]
pub struct FrameRegistry {
    entries: Vec<Option<FrameEntry>>,
    resources: Vec<ResourceFrame>,
    live: usize,
}

impl FrameRegistry {
    /// Allocate both tables for `capacity` frames.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut entries = Vec::new();
        entries.try_reserve_exact(capacity).map_err(|e| {
            Error::AllocationFailed(format!("frame table of {capacity}: {e}"))
        })?;
        entries.resize(capacity, None);

        let mut resources = Vec::new();
        resources.try_reserve_exact(capacity).map_err(|e| {
            Error::AllocationFailed(format!("resource frames of {capacity}: {e}"))
        })?;
        resources.resize_with(capacity, ResourceFrame::default);

        Ok(Self {
            entries,
            resources,
            live: 0,
        })
    }

    /// Register a frame and bind it to an engine.
    ///
    /// Claims the lowest free hardware context and, inside it, the lowest
    /// free engine of the frame's direction.
    pub fn register(&mut self, engines: &mut EnginePool, desc: &FrameDescriptor) -> Result<FrameId> {
        if desc.addr == 0 {
            return Err(Error::NullFrame);
        }
        if self.lookup(desc.addr).is_some() {
            return Err(Error::AlreadyRegistered { addr: desc.addr });
        }
        let slot = self
            .entries
            .iter()
            .position(Option::is_none)
            .ok_or(Error::FrameTableFull {
                capacity: self.entries.len(),
            })?;
        let context = engines
            .first_free_context()
            .ok_or(Error::NoFreeHardwareContext)?;
        let engine = engines.acquire(context, desc.direction)?;

        let id = FrameId(slot);
        engines.bind(engine, id);
        self.entries[slot] = Some(FrameEntry {
            addr: desc.addr,
            engine,
            fold: None,
            direction: desc.direction,
            id,
        });
        self.resources[slot] = ResourceFrame::from_descriptor(desc);
        self.live += 1;
        Ok(id)
    }

    /// Unregister a frame, releasing its engine and unlinking its fold.
    ///
    /// The fold slot itself stays allocated.
    pub fn unregister(
        &mut self,
        engines: &mut EnginePool,
        folds: &mut FoldTable,
        addr: usize,
    ) -> Result<FrameId> {
        let id = self.require(addr)?;
        let Some(entry) = self.entries[id.0] else {
            return Err(Error::NotFound { addr });
        };

        if let Some(fold) = entry.fold {
            folds.unlink(fold)?;
        }
        self.entries[id.0] = None;
        engines.release(entry.engine);
        self.resources[id.0] = ResourceFrame::default();
        self.live -= 1;
        Ok(id)
    }

    /// Frame registered at `addr`.
    pub fn lookup(&self, addr: usize) -> Option<FrameId> {
        self.entries
            .iter()
            .flatten()
            .find(|e| e.addr == addr)
            .map(|e| e.id)
    }

    /// Frame registered at `addr`, or `NotFound`.
    pub fn require(&self, addr: usize) -> Result<FrameId> {
        self.lookup(addr).ok_or(Error::NotFound { addr })
    }

    /// Table entry of a live frame.
    pub fn entry(&self, id: FrameId) -> Option<&FrameEntry> {
        self.entries.get(id.0)?.as_ref()
    }

    /// Resource descriptor of a live frame.
    pub fn resource(&self, id: FrameId) -> Option<&ResourceFrame> {
        self.entry(id)?;
        self.resources.get(id.0)
    }

    /// Mutable resource descriptor of a live frame.
    pub fn resource_mut(&mut self, id: FrameId) -> Option<&mut ResourceFrame> {
        self.entry(id)?;
        self.resources.get_mut(id.0)
    }

    /// Record the fold linked to a frame on both sides of the parallel arrays.
    pub fn set_fold(&mut self, id: FrameId, fold: FoldId) {
        if let Some(Some(entry)) = self.entries.get_mut(id.0) {
            entry.fold = Some(fold);
            self.resources[id.0].fold = Some(fold);
        }
    }

    /// Live frame whose entry links `fold`.
    pub fn owner_of(&self, fold: FoldId) -> Option<FrameId> {
        self.entries
            .iter()
            .flatten()
            .find(|e| e.fold == Some(fold))
            .map(|e| e.id)
    }

    /// Number of live frames.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no frame is registered.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Frame capacity.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Live entries in table order.
    pub fn iter(&self) -> impl Iterator<Item = &FrameEntry> {
        self.entries.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fold::RegionHandles;

    fn nv12(addr: usize, direction: Direction) -> FrameDescriptor {
        FrameDescriptor::new(addr, PixelFormat::Nv12, direction, 64, 64)
    }

    #[test]
    fn test_register_claims_lowest_context() {
        let mut engines = EnginePool::new(4, 1, 1).unwrap();
        let mut reg = FrameRegistry::with_capacity(4).unwrap();

        let a = reg.register(&mut engines, &nv12(0x1000, Direction::Read)).unwrap();
        let b = reg.register(&mut engines, &nv12(0x2000, Direction::Write)).unwrap();
        assert_eq!((a, b), (FrameId(0), FrameId(1)));

        assert_eq!(reg.entry(a).unwrap().engine.context, 0);
        assert_eq!(reg.entry(b).unwrap().engine.context, 1);
        assert_eq!(engines.engine(reg.entry(a).unwrap().engine).unwrap().frame(), Some(a));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_register_errors() {
        let mut engines = EnginePool::new(1, 0, 2).unwrap();
        let mut reg = FrameRegistry::with_capacity(4).unwrap();

        assert_eq!(
            reg.register(&mut engines, &nv12(0x1000, Direction::Read)),
            Err(Error::NoFreeEngine {
                context: 0,
                direction: Direction::Read
            })
        );
        reg.register(&mut engines, &nv12(0x1000, Direction::Write)).unwrap();
        assert_eq!(
            reg.register(&mut engines, &nv12(0x1000, Direction::Write)),
            Err(Error::AlreadyRegistered { addr: 0x1000 })
        );
        assert_eq!(
            reg.register(&mut engines, &nv12(0x2000, Direction::Write)),
            Err(Error::NoFreeHardwareContext)
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_frame_table_full() {
        let mut engines = EnginePool::new(4, 1, 1).unwrap();
        let mut reg = FrameRegistry::with_capacity(1).unwrap();
        reg.register(&mut engines, &nv12(0x1000, Direction::Read)).unwrap();
        assert_eq!(
            reg.register(&mut engines, &nv12(0x2000, Direction::Read)),
            Err(Error::FrameTableFull { capacity: 1 })
        );
    }

    #[test]
    fn test_unregister_releases_everything() {
        let mut engines = EnginePool::new(1, 1, 1).unwrap();
        let mut folds = FoldTable::with_capacity(1).unwrap();
        let mut reg = FrameRegistry::with_capacity(2).unwrap();

        let id = reg.register(&mut engines, &nv12(0x1000, Direction::Read)).unwrap();
        let fold = folds.allocate(0x9000, 0x9000, RegionHandles::default()).unwrap();
        folds.link(fold, id, std::thread::current().id()).unwrap();
        reg.set_fold(id, fold);
        assert_eq!(reg.owner_of(fold), Some(id));

        let engine = reg.entry(id).unwrap().engine;
        assert_eq!(reg.unregister(&mut engines, &mut folds, 0x1000), Ok(id));

        assert!(reg.is_empty());
        assert_eq!(reg.lookup(0x1000), None);
        assert!(reg.resource(id).is_none());
        assert!(!engines.engine(engine).unwrap().in_use());
        assert!(!engines.context(0).unwrap().in_use());
        assert!(!folds.slot(fold).unwrap().in_use());
        assert_eq!(folds.find_free(), Some(fold));

        assert_eq!(
            reg.unregister(&mut engines, &mut folds, 0x1000),
            Err(Error::NotFound { addr: 0x1000 })
        );
    }

    #[test]
    fn test_freed_slot_is_reused() {
        let mut engines = EnginePool::new(4, 1, 1).unwrap();
        let mut folds = FoldTable::with_capacity(0).unwrap();
        let mut reg = FrameRegistry::with_capacity(2).unwrap();

        reg.register(&mut engines, &nv12(0x1000, Direction::Read)).unwrap();
        reg.register(&mut engines, &nv12(0x2000, Direction::Read)).unwrap();
        reg.unregister(&mut engines, &mut folds, 0x1000).unwrap();

        let c = reg.register(&mut engines, &nv12(0x3000, Direction::Read)).unwrap();
        assert_eq!(c, FrameId(0));
        assert_eq!(reg.lookup(0x2000), Some(FrameId(1)));
    }

    #[test]
    fn test_fold_buffer_size() {
        let mut res = ResourceFrame {
            format: PixelFormat::Nv12,
            ..Default::default()
        };
        let geometry = FoldGeometry {
            width: 128,
            height: 16,
            stride: 128,
            count: 2,
        };
        res.set_fold_geometry(geometry).unwrap();
        assert_eq!(res.fold_buffer_size, 16 * 128 * 2);

        res.padding = true;
        res.set_fold_geometry(geometry).unwrap();
        assert_eq!(res.fold_buffer_size, 16 * 128 * 2 * 2);

        let mut tp10 = ResourceFrame {
            format: PixelFormat::Tp10,
            ..Default::default()
        };
        tp10.set_fold_geometry(FoldGeometry {
            width: 96,
            height: 3,
            stride: 96,
            count: 1,
        })
        .unwrap();
        assert_eq!(tp10.fold_buffer_size, 192);
    }

    #[test]
    fn test_fold_geometry_overflow_rejected() {
        let mut res = ResourceFrame {
            format: PixelFormat::Nv12,
            padding: true,
            ..Default::default()
        };
        let huge = FoldGeometry {
            width: 64,
            height: u32::MAX,
            stride: u32::MAX,
            count: 4,
        };
        assert_eq!(
            res.set_fold_geometry(huge),
            Err(Error::FoldSizeOverflow {
                height: u32::MAX,
                stride: u32::MAX,
                count: 4,
            })
        );
        assert_eq!(res.fold_geometry, None);
        assert_eq!(res.fold_buffer_size, 0);

        let mut tp10 = ResourceFrame {
            format: PixelFormat::Tp10,
            ..Default::default()
        };
        let err = tp10
            .set_fold_geometry(FoldGeometry {
                width: 96,
                height: 1 << 30,
                stride: 1 << 30,
                count: 16,
            })
            .unwrap_err();
        assert!(matches!(err, Error::FoldSizeOverflow { count: 16, .. }));
    }

    #[test]
    fn test_null_frame_rejected() {
        let mut engines = EnginePool::new(1, 1, 1).unwrap();
        let mut reg = FrameRegistry::with_capacity(2).unwrap();
        assert_eq!(
            reg.register(&mut engines, &nv12(0, Direction::Read)),
            Err(Error::NullFrame)
        );
        assert!(reg.is_empty());
        assert_eq!(engines.first_free_context(), Some(0));
    }

    #[test]
    fn test_failed_unregister_keeps_frame() {
        let mut engines = EnginePool::new(1, 1, 1).unwrap();
        let mut folds = FoldTable::with_capacity(1).unwrap();
        let mut reg = FrameRegistry::with_capacity(2).unwrap();

        let id = reg.register(&mut engines, &nv12(0x1000, Direction::Read)).unwrap();
        // Linkage to a slot the fold table never allocated.
        reg.set_fold(id, FoldId::new(3));

        assert!(matches!(
            reg.unregister(&mut engines, &mut folds, 0x1000),
            Err(Error::InvalidFoldReference(_))
        ));
        assert_eq!(reg.lookup(0x1000), Some(id));
        assert_eq!(reg.len(), 1);
        assert!(reg.resource(id).is_some());
        let engine = reg.entry(id).unwrap().engine;
        assert!(engines.engine(engine).unwrap().in_use());
        assert!(engines.context(0).unwrap().in_use());
    }
}
