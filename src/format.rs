//! Pixel formats, planes, and transfer directions.
//!
//! The compiled pipeline passes formats and directions as raw integer codes.
//! [`PixelFormat::from_code`] and [`Direction::from_code`] are the only places
//! those codes are interpreted.

use std::fmt;

use crate::error::{Error, Result};

/// Frame pixel format as seen by the pipeline.
///
/// Codes `0..=5` match the runtime ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// NV12, linear layout.
    #[default]
    Nv12,
    /// NV12, bandwidth-compressed (packed) layout.
    Nv12Packed,
    /// P010: 10-bit NV12 in 16-bit containers.
    P010,
    /// TP10: three 10-bit samples packed into 32 bits.
    Tp10,
    /// NV12 with 4-row interleave, linear layout.
    Nv124r,
    /// NV12 with 4-row interleave, packed layout.
    Nv124rPacked,
}

impl PixelFormat {
    /// All formats in code order.
    pub const ALL: [PixelFormat; 6] = [
        PixelFormat::Nv12,
        PixelFormat::Nv12Packed,
        PixelFormat::P010,
        PixelFormat::Tp10,
        PixelFormat::Nv124r,
        PixelFormat::Nv124rPacked,
    ];

    /// Parse a raw format code.
    pub fn from_code(code: i32) -> Result<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .ok_or(Error::InvalidFormat(code))
    }

    /// Raw format code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether the frame uses the packed (compressed) layout.
    pub fn is_packed(self) -> bool {
        matches!(self, PixelFormat::Nv12Packed | PixelFormat::Nv124rPacked)
    }

    /// Engine format for the luma plane.
    pub fn luma(self) -> DmaFormat {
        match self {
            PixelFormat::Nv12 | PixelFormat::Nv12Packed => DmaFormat::Nv12Y,
            PixelFormat::P010 => DmaFormat::P010Y,
            PixelFormat::Tp10 => DmaFormat::Tp10Y,
            PixelFormat::Nv124r | PixelFormat::Nv124rPacked => DmaFormat::Nv124rY,
        }
    }

    /// Engine format for the chroma plane.
    pub fn chroma(self) -> DmaFormat {
        match self {
            PixelFormat::Nv12 | PixelFormat::Nv12Packed => DmaFormat::Nv12Uv,
            PixelFormat::P010 => DmaFormat::P010Uv,
            PixelFormat::Tp10 => DmaFormat::Tp10Uv,
            PixelFormat::Nv124r | PixelFormat::Nv124rPacked => DmaFormat::Nv124rUv,
        }
    }

    /// Scale a byte count by the format's storage density.
    ///
    /// TP10 stores three samples in four bytes, so its fold buffers are
    /// two thirds the size of the 8-bit equivalent.
    pub fn scale_size(self, bytes: usize) -> usize {
        match self {
            PixelFormat::Tp10 => bytes / 3 * 2 + bytes % 3 * 2 / 3,
            _ => bytes,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Nv12Packed => "NV12-packed",
            PixelFormat::P010 => "P010",
            PixelFormat::Tp10 => "TP10",
            PixelFormat::Nv124r => "NV124R",
            PixelFormat::Nv124rPacked => "NV124R-packed",
        };
        f.write_str(name)
    }
}

/// Per-plane format understood by the transfer engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmaFormat {
    /// NV12 luma.
    Nv12Y,
    /// NV12 interleaved chroma.
    Nv12Uv,
    /// P010 luma.
    P010Y,
    /// P010 interleaved chroma.
    P010Uv,
    /// TP10 luma.
    Tp10Y,
    /// TP10 interleaved chroma.
    Tp10Uv,
    /// NV124R luma.
    Nv124rY,
    /// NV124R interleaved chroma.
    Nv124rUv,
}

/// Which planes of a frame are transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Plane {
    /// Luma only.
    Luma,
    /// Chroma only.
    Chroma,
    /// Luma and chroma.
    #[default]
    Both,
}

impl Plane {
    /// Number of planes this selector covers.
    pub fn components(self) -> u32 {
        match self {
            Plane::Luma | Plane::Chroma => 1,
            Plane::Both => 2,
        }
    }
}

/// Direction of a frame's traffic relative to local memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Main memory into local memory.
    Read,
    /// Local memory back to main memory.
    Write,
}

impl Direction {
    /// Parse a raw direction code: `0` reads, anything else writes.
    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            Direction::Read
        } else {
            Direction::Write
        }
    }

    /// Whether this is the read direction.
    pub fn is_read(self) -> bool {
        self == Direction::Read
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_codes() {
        for (code, fmt) in PixelFormat::ALL.iter().enumerate() {
            assert_eq!(PixelFormat::from_code(code as i32).unwrap(), *fmt);
            assert_eq!(fmt.code(), code as i32);
        }
        assert_eq!(PixelFormat::from_code(6), Err(Error::InvalidFormat(6)));
        assert_eq!(PixelFormat::from_code(-1), Err(Error::InvalidFormat(-1)));
    }

    #[test]
    fn test_packed_variants() {
        let packed: Vec<_> = PixelFormat::ALL
            .iter()
            .filter(|f| f.is_packed())
            .collect();
        assert_eq!(packed, [&PixelFormat::Nv12Packed, &PixelFormat::Nv124rPacked]);
    }

    #[test]
    fn test_sub_formats() {
        assert_eq!(PixelFormat::Nv12Packed.luma(), DmaFormat::Nv12Y);
        assert_eq!(PixelFormat::Nv12Packed.chroma(), DmaFormat::Nv12Uv);
        assert_eq!(PixelFormat::Tp10.chroma(), DmaFormat::Tp10Uv);
    }

    #[test]
    fn test_tp10_scaling() {
        assert_eq!(PixelFormat::Tp10.scale_size(300), 200);
        assert_eq!(PixelFormat::Nv12.scale_size(300), 300);
        assert_eq!(PixelFormat::Tp10.scale_size(301), 200);
        assert_eq!(PixelFormat::Tp10.scale_size(302), 201);
        assert_eq!(
            PixelFormat::Tp10.scale_size(usize::MAX),
            (usize::MAX as u128 * 2 / 3) as usize
        );
    }

    #[test]
    fn test_direction_codes() {
        assert_eq!(Direction::from_code(0), Direction::Read);
        assert_eq!(Direction::from_code(1), Direction::Write);
        assert_eq!(Direction::from_code(7), Direction::Write);
        assert_eq!(Plane::Both.components(), 2);
        assert_eq!(Plane::Chroma.components(), 1);
    }
}
