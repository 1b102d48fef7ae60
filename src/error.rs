//! Error types for tiledma.

use thiserror::Error;

use crate::align::Alignment;

/// Result type alias using tiledma's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for DMA resource management.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A backing pool could not be allocated at session creation.
    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    /// Every hardware context is already serving a frame.
    #[error("no free hardware context")]
    NoFreeHardwareContext,

    /// The claimed hardware context has no free engine of the requested direction.
    #[error("no free {direction} engine in hardware context {context}")]
    NoFreeEngine {
        /// Hardware context that was searched.
        context: usize,
        /// Requested transfer direction.
        direction: crate::format::Direction,
    },

    /// The host address is already registered.
    #[error("frame {addr:#x} is already registered")]
    AlreadyRegistered {
        /// Host virtual address of the frame.
        addr: usize,
    },

    /// A null host address was offered as a frame.
    #[error("null frame address")]
    NullFrame,

    /// The host address is not registered.
    #[error("frame {addr:#x} not found")]
    NotFound {
        /// Host virtual address of the frame.
        addr: usize,
    },

    /// The frame table has no free entry.
    #[error("frame table full: capacity {capacity}")]
    FrameTableFull {
        /// Configured frame capacity.
        capacity: usize,
    },

    /// The pixel format code is outside the known range.
    #[error("invalid pixel format code {0}")]
    InvalidFormat(i32),

    /// The region origin is not a multiple of the format alignment.
    #[error("region origin ({x}, {y}) not aligned to {align}")]
    UnalignedOrigin {
        /// Horizontal origin in pixels.
        x: u32,
        /// Vertical origin in pixels.
        y: u32,
        /// Required alignment.
        align: Alignment,
    },

    /// The region extent is not a multiple of the format alignment.
    #[error("region extent {width}x{height} not aligned to {align}")]
    UnalignedExtent {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
        /// Required alignment.
        align: Alignment,
    },

    /// The requested fold geometry does not fit in the address space.
    #[error("fold buffer of {height} rows x {stride} stride x {count} folds overflows")]
    FoldSizeOverflow {
        /// Fold height in pixels.
        height: u32,
        /// Fold stride in pixels.
        stride: u32,
        /// Number of folds.
        count: u32,
    },

    /// All fold-storage slots have been allocated.
    #[error("fold table exhausted: capacity {capacity}")]
    FoldTableExhausted {
        /// Fold table capacity.
        capacity: usize,
    },

    /// A fold id or staging address does not name an allocated slot.
    #[error("invalid fold reference: {0}")]
    InvalidFoldReference(String),

    /// A per-tile operation found no frame/fold linkage.
    #[error("missing linkage: {0}")]
    MissingLinkage(String),

    /// The session has been torn down.
    #[error("session closed")]
    SessionClosed,

    /// A lifecycle transition was attempted from the wrong state.
    #[error("invalid session state: expected {expected}, found {actual}")]
    InvalidState {
        /// State the operation requires.
        expected: &'static str,
        /// State the session is in.
        actual: &'static str,
    },

    /// A thread panicked while holding the session lock.
    #[error("session lock poisoned")]
    LockPoisoned,
}

impl Error {
    /// Whether this error leaves the session unusable.
    ///
    /// Only the session that raised it is affected.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::AllocationFailed(_) | Error::FoldTableExhausted { .. }
        )
    }

    /// Short stable name, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::AllocationFailed(_) => "allocation_failed",
            Error::NoFreeHardwareContext => "no_free_hardware_context",
            Error::NoFreeEngine { .. } => "no_free_engine",
            Error::AlreadyRegistered { .. } => "already_registered",
            Error::NullFrame => "null_frame",
            Error::NotFound { .. } => "not_found",
            Error::FrameTableFull { .. } => "frame_table_full",
            Error::InvalidFormat(_) => "invalid_format",
            Error::UnalignedOrigin { .. } => "unaligned_origin",
            Error::UnalignedExtent { .. } => "unaligned_extent",
            Error::FoldSizeOverflow { .. } => "fold_size_overflow",
            Error::FoldTableExhausted { .. } => "fold_table_exhausted",
            Error::InvalidFoldReference(_) => "invalid_fold_reference",
            Error::MissingLinkage(_) => "missing_linkage",
            Error::SessionClosed => "session_closed",
            Error::InvalidState { .. } => "invalid_state",
            Error::LockPoisoned => "lock_poisoned",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Direction;

    #[test]
    fn test_fatal_kinds() {
        assert!(Error::AllocationFailed("x".into()).is_fatal());
        assert!(Error::FoldTableExhausted { capacity: 2 }.is_fatal());
        assert!(!Error::NoFreeHardwareContext.is_fatal());
        assert!(!Error::NotFound { addr: 0x1000 }.is_fatal());
    }

    #[test]
    fn test_display_includes_key() {
        let err = Error::AlreadyRegistered { addr: 0x1000 };
        assert_eq!(err.to_string(), "frame 0x1000 is already registered");

        let err = Error::NoFreeEngine {
            context: 2,
            direction: Direction::Read,
        };
        assert_eq!(err.to_string(), "no free read engine in hardware context 2");
    }
}
