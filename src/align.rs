//! Region alignment validation.
//!
//! Transfer engines can only move regions whose origin and extent are
//! multiples of a per-format granularity. The granularity table belongs to
//! the platform, so it is consulted through [`AlignmentTable`].

use std::fmt;

use crate::error::{Error, Result};
use crate::format::{DmaFormat, PixelFormat};

/// Minimum region granularity in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Alignment {
    /// Horizontal granularity.
    pub width: u32,
    /// Vertical granularity.
    pub height: u32,
}

impl Alignment {
    /// Create an alignment requirement.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether `value` is a multiple of `step`. A zero step places no constraint.
    #[inline]
    fn fits(value: u32, step: u32) -> bool {
        step == 0 || value % step == 0
    }

    /// Whether a point lies on the alignment grid.
    pub fn admits_origin(&self, x: u32, y: u32) -> bool {
        Self::fits(x, self.width) && Self::fits(y, self.height)
    }

    /// Whether an extent is a whole number of alignment cells.
    pub fn admits_extent(&self, width: u32, height: u32) -> bool {
        Self::fits(width, self.width) && Self::fits(height, self.height)
    }

    /// Check a region, origin first.
    pub fn check(&self, x: u32, y: u32, width: u32, height: u32) -> Result<()> {
        if !self.admits_origin(x, y) {
            return Err(Error::UnalignedOrigin { x, y, align: *self });
        }
        if !self.admits_extent(width, height) {
            return Err(Error::UnalignedExtent {
                width,
                height,
                align: *self,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Platform lookup of transfer granularity.
pub trait AlignmentTable: Send + Sync {
    /// Granularity for `format`, in its packed or linear layout.
    fn alignment_for(&self, format: DmaFormat, packed: bool) -> Alignment;
}

/// Built-in granularity table.
///
/// Linear layouts need whole chroma pairs and a 16-pixel horizontal step
/// (48 for TP10, whose words hold three samples). Packed layouts are tiled
/// and need whole tiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAlignmentTable;

impl AlignmentTable for DefaultAlignmentTable {
    fn alignment_for(&self, format: DmaFormat, packed: bool) -> Alignment {
        use DmaFormat::*;

        if packed {
            return match format {
                Nv124rY | Nv124rUv => Alignment::new(128, 16),
                _ => Alignment::new(128, 32),
            };
        }

        match format {
            Nv12Y | Nv124rY => Alignment::new(16, 1),
            Nv12Uv | Nv124rUv => Alignment::new(16, 2),
            P010Y => Alignment::new(8, 1),
            P010Uv => Alignment::new(8, 2),
            Tp10Y => Alignment::new(48, 1),
            Tp10Uv => Alignment::new(48, 2),
        }
    }
}

/// Look up the alignment that governs regions of `format`.
///
/// The chroma plane has the coarser requirement, so it decides for the frame.
pub fn alignment_of(table: &dyn AlignmentTable, format: PixelFormat) -> Alignment {
    table.alignment_for(format.chroma(), format.is_packed())
}

/// Check a region of a `format` frame against the platform granularity.
///
/// The origin is checked before the extent.
pub fn validate(
    table: &dyn AlignmentTable,
    format: PixelFormat,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> Result<()> {
    alignment_of(table, format).check(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Alignment);

    impl AlignmentTable for Fixed {
        fn alignment_for(&self, _format: DmaFormat, _packed: bool) -> Alignment {
            self.0
        }
    }

    #[test]
    fn test_nv12_linear_region() {
        let table = DefaultAlignmentTable;
        assert!(validate(&table, PixelFormat::Nv12, 0, 0, 64, 64).is_ok());
        assert!(validate(&table, PixelFormat::Nv12, 16, 2, 32, 4).is_ok());
    }

    #[test]
    fn test_origin_rejected_first() {
        let table = DefaultAlignmentTable;
        let err = validate(&table, PixelFormat::Nv12, 3, 0, 5, 5).unwrap_err();
        assert!(matches!(err, Error::UnalignedOrigin { x: 3, y: 0, .. }));
    }

    #[test]
    fn test_extent_rejected() {
        let table = DefaultAlignmentTable;
        let err = validate(&table, PixelFormat::Nv12, 0, 0, 20, 4).unwrap_err();
        assert_eq!(
            err,
            Error::UnalignedExtent {
                width: 20,
                height: 4,
                align: Alignment::new(16, 2),
            }
        );
        let err = validate(&table, PixelFormat::Nv12, 0, 0, 16, 3).unwrap_err();
        assert!(matches!(err, Error::UnalignedExtent { .. }));
    }

    #[test]
    fn test_packed_uses_tile_granularity() {
        let table = DefaultAlignmentTable;
        assert!(validate(&table, PixelFormat::Nv12Packed, 0, 0, 64, 64).is_err());
        assert!(validate(&table, PixelFormat::Nv12Packed, 128, 32, 256, 64).is_ok());
    }

    #[test]
    fn test_custom_table_and_zero_step() {
        let table = Fixed(Alignment::new(0, 4));
        assert!(validate(&table, PixelFormat::P010, 7, 8, 9, 12).is_ok());
        assert!(validate(&table, PixelFormat::P010, 7, 9, 9, 12).is_err());
    }
}
