//! Virtual-to-physical address resolution for staging memory.

/// Resolves the physical address the engines use for a staging buffer.
pub trait AddressTranslator: Send + Sync {
    /// Physical address backing `virt`.
    fn physical_address_of(&self, virt: usize) -> u64;
}

/// Treats virtual addresses as physical. Suitable for flat memory maps.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

impl AddressTranslator for IdentityTranslator {
    fn physical_address_of(&self, virt: usize) -> u64 {
        virt as u64
    }
}

/// Maps one contiguous virtual window onto a physical base.
#[derive(Debug, Clone, Copy)]
pub struct OffsetTranslator {
    virt_base: usize,
    phys_base: u64,
}

impl OffsetTranslator {
    /// Map `virt_base..` onto `phys_base..`.
    pub fn new(virt_base: usize, phys_base: u64) -> Self {
        Self {
            virt_base,
            phys_base,
        }
    }
}

impl AddressTranslator for OffsetTranslator {
    fn physical_address_of(&self, virt: usize) -> u64 {
        self.phys_base
            .wrapping_add(virt.wrapping_sub(self.virt_base) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        assert_eq!(IdentityTranslator.physical_address_of(0xd800_0000), 0xd800_0000);
    }

    #[test]
    fn test_offset_window() {
        let t = OffsetTranslator::new(0x4000_0000, 0x1_0000_0000);
        assert_eq!(t.physical_address_of(0x4000_0000), 0x1_0000_0000);
        assert_eq!(t.physical_address_of(0x4000_1000), 0x1_0000_1000);
    }
}
