//! Fold storage: the local staging buffers that hold tiles in flight.
//!
//! A fold slot is created once, when the caller hands the manager a staging
//! buffer it has already mapped. The slot count only grows, up to the table's
//! fixed capacity. Detaching a frame unlinks its fold but keeps the slot, so
//! a later frame can pick the same staging buffer up through
//! [`FoldTable::find_free`] without a new allocation.

use std::fmt;
use std::thread::ThreadId;

use crate::align::Alignment;
use crate::error::{Error, Result};
use crate::frame::FrameId;

/// Index of a fold slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FoldId(usize);

impl FoldId {
    /// Wrap a raw slot index.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw slot index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fold{}", self.0)
    }
}

/// Memory regions backing a staging buffer.
///
/// The manager only stores these; mapping and freeing them is the caller's job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionHandles {
    /// Region holding tile data.
    pub data_region: usize,
    /// Size of the data region in bytes.
    pub data_size: usize,
    /// Virtual address of the descriptor memory.
    pub desc_addr: usize,
    /// Region holding transfer descriptors.
    pub desc_region: usize,
    /// Size of the descriptor region in bytes.
    pub desc_size: usize,
}

/// Region of interest within a frame, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Roi {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl Roi {
    /// Create a region.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Everything the descriptor layer needs to program one tile transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferParams {
    /// Current region of interest.
    pub roi: Roi,
    /// Physical base address of the staging buffer.
    pub phys_base: u64,
    /// Byte offset of the active fold within the staging buffer.
    pub offset: usize,
    /// Byte offset of the chroma plane within a fold.
    pub chroma_offset: usize,
}

/// Staging memory registered for a slot, handed back so the caller can
/// release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionParams {
    /// Slot the memory was registered under.
    pub fold: FoldId,
    /// Staging buffer virtual address.
    pub virt: usize,
    /// Staging buffer physical address.
    pub phys: u64,
    /// Backing regions and their sizes.
    pub regions: RegionHandles,
}

/// One staging buffer and the tile it currently holds.
#[derive(Debug, Clone)]
pub struct FoldSlot {
    virt: usize,
    phys: u64,
    regions: RegionHandles,
    in_use: bool,
    thread: Option<ThreadId>,
    frame: Option<FrameId>,
    offset: usize,
    roi: Roi,
    chroma_offset: usize,
}

impl FoldSlot {
    fn new(virt: usize, phys: u64, regions: RegionHandles) -> Self {
        Self {
            virt,
            phys,
            regions,
            in_use: false,
            thread: None,
            frame: None,
            offset: 0,
            roi: Roi::default(),
            chroma_offset: 0,
        }
    }

    /// Drop the frame linkage. The staging buffer stays allocated.
    fn unlink(&mut self) {
        self.in_use = false;
        self.thread = None;
        self.frame = None;
    }

    /// Staging buffer virtual address.
    pub fn virt(&self) -> usize {
        self.virt
    }

    /// Staging buffer physical address.
    pub fn phys(&self) -> u64 {
        self.phys
    }

    /// Backing regions.
    pub fn regions(&self) -> &RegionHandles {
        &self.regions
    }

    /// Whether a frame is linked to this slot.
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    /// Thread that linked the slot.
    pub fn thread(&self) -> Option<ThreadId> {
        self.thread
    }

    /// Frame linked to this slot.
    pub fn frame(&self) -> Option<FrameId> {
        self.frame
    }

    /// Active byte offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Current region of interest.
    pub fn roi(&self) -> Roi {
        self.roi
    }

    /// Chroma plane offset.
    pub fn chroma_offset(&self) -> usize {
        self.chroma_offset
    }
}

/// Fixed-capacity table of fold slots.
#[derive(Debug, Clone)]
pub struct FoldTable {
    slots: Vec<FoldSlot>,
    capacity: usize,
}

impl FoldTable {
    /// Reserve room for `capacity` slots up front.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).map_err(|e| {
            Error::AllocationFailed(format!("{capacity} fold slots: {e}"))
        })?;
        Ok(Self { slots, capacity })
    }

    /// Register a staging buffer and return its slot.
    ///
    /// Slots are handed out in order and never reclaimed, so this fails only
    /// when the table is full or the address is null or already known.
    pub fn allocate(&mut self, virt: usize, phys: u64, regions: RegionHandles) -> Result<FoldId> {
        if virt == 0 {
            return Err(Error::InvalidFoldReference(
                "null staging address".into(),
            ));
        }
        if self.find_by_addr(virt).is_some() {
            return Err(Error::InvalidFoldReference(format!(
                "staging buffer {virt:#x} already registered"
            )));
        }
        if self.slots.len() >= self.capacity {
            return Err(Error::FoldTableExhausted {
                capacity: self.capacity,
            });
        }
        let id = FoldId(self.slots.len());
        self.slots.push(FoldSlot::new(virt, phys, regions));
        Ok(id)
    }

    /// Lowest allocated slot that no frame is linked to.
    pub fn find_free(&self) -> Option<FoldId> {
        self.slots.iter().position(|s| !s.in_use).map(FoldId)
    }

    /// Slot registered for staging address `virt`.
    pub fn find_by_addr(&self, virt: usize) -> Option<FoldId> {
        self.slots.iter().position(|s| s.virt == virt).map(FoldId)
    }

    /// Link a slot to a frame on behalf of `thread`.
    pub fn link(&mut self, id: FoldId, frame: FrameId, thread: ThreadId) -> Result<()> {
        let slot = self.slot_mut(id)?;
        if let Some(owner) = slot.frame.filter(|owner| *owner != frame) {
            return Err(Error::InvalidFoldReference(format!(
                "{id} already linked to {owner}"
            )));
        }
        slot.in_use = true;
        slot.thread = Some(thread);
        slot.frame = Some(frame);
        Ok(())
    }

    /// Unlink a slot from its frame, keeping it allocated for reuse.
    pub fn unlink(&mut self, id: FoldId) -> Result<()> {
        self.slot_mut(id)?.unlink();
        Ok(())
    }

    /// Store a region of interest after checking it against `align`.
    ///
    /// A rejected region leaves the slot untouched.
    pub fn set_roi(&mut self, id: FoldId, roi: Roi, align: Alignment) -> Result<()> {
        let slot = self.slot_mut(id)?;
        align.check(roi.x, roi.y, roi.width, roi.height)?;
        slot.roi = roi;
        Ok(())
    }

    /// Select the active fold within the staging buffer.
    pub fn set_offset(&mut self, id: FoldId, offset: usize) -> Result<()> {
        self.slot_mut(id)?.offset = offset;
        Ok(())
    }

    /// Set the chroma plane offset within a fold.
    pub fn set_chroma_offset(&mut self, id: FoldId, offset: usize) -> Result<()> {
        self.slot_mut(id)?.chroma_offset = offset;
        Ok(())
    }

    /// Parameters for the next transfer through `id`.
    pub fn transfer_params(&self, id: FoldId) -> Result<TransferParams> {
        let slot = self.slot(id)?;
        Ok(TransferParams {
            roi: slot.roi,
            phys_base: slot.phys,
            offset: slot.offset,
            chroma_offset: slot.chroma_offset,
        })
    }

    /// Staging memory behind `id`.
    pub fn region_params(&self, id: FoldId) -> Result<RegionParams> {
        let slot = self.slot(id)?;
        Ok(RegionParams {
            fold: id,
            virt: slot.virt,
            phys: slot.phys,
            regions: slot.regions,
        })
    }

    /// Staging memory of every allocated slot.
    pub fn regions(&self) -> impl Iterator<Item = RegionParams> + '_ {
        self.slots.iter().enumerate().map(|(i, slot)| RegionParams {
            fold: FoldId(i),
            virt: slot.virt,
            phys: slot.phys,
            regions: slot.regions,
        })
    }

    /// A slot by id.
    pub fn slot(&self, id: FoldId) -> Result<&FoldSlot> {
        self.slots
            .get(id.0)
            .ok_or_else(|| Error::InvalidFoldReference(format!("{id} not allocated")))
    }

    fn slot_mut(&mut self, id: FoldId) -> Result<&mut FoldSlot> {
        self.slots
            .get_mut(id.0)
            .ok_or_else(|| Error::InvalidFoldReference(format!("{id} not allocated")))
    }

    /// Forget every slot. Capacity is kept.
    pub fn reset(&mut self) {
        self.slots.clear();
    }

    /// Number of allocated slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot has been allocated.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Maximum number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots linked to a frame.
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use).count()
    }
}
