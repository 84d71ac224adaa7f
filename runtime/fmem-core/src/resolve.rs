//! Address Resolver - validate a request and compute its bus address

use crate::device::MappedDevice;
use crate::{FmemError, Result};

/// Width of a single access in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum AccessWidth {
    Byte = 1,
    Half = 2,
    Word = 4,
}

impl AccessWidth {
    pub const ALL: [AccessWidth; 3] = [AccessWidth::Byte, AccessWidth::Half, AccessWidth::Word];

    /// Number of bytes accessed
    pub const fn bytes(self) -> u32 {
        self as u32
    }

    /// AXI4 AxSIZE encoding (log2 of the byte count)
    pub const fn size_code(self) -> u8 {
        match self {
            AccessWidth::Byte => 0,
            AccessWidth::Half => 1,
            AccessWidth::Word => 2,
        }
    }

    /// Mask selecting the bits of a value that fit in this width
    pub const fn value_mask(self) -> u32 {
        match self {
            AccessWidth::Byte => 0xFF,
            AccessWidth::Half => 0xFFFF,
            AccessWidth::Word => 0xFFFF_FFFF,
        }
    }
}

impl TryFrom<u32> for AccessWidth {
    type Error = FmemError;

    fn try_from(width: u32) -> Result<Self> {
        match width {
            1 => Ok(AccessWidth::Byte),
            2 => Ok(AccessWidth::Half),
            4 => Ok(AccessWidth::Word),
            _ => Err(FmemError::InvalidWidth { width }),
        }
    }
}

impl TryFrom<u8> for AccessWidth {
    type Error = FmemError;

    fn try_from(width: u8) -> Result<Self> {
        AccessWidth::try_from(u32::from(width))
    }
}

/// Validate a raw request against `device` and compute its absolute address
///
/// # Arguments
/// * `device` - Target device window
/// * `relative_offset` - Byte offset inside the window
/// * `access_width` - Raw access width in bytes
///
/// # Returns
/// `device.base_addr + relative_offset`, wrapping at 2^32
///
/// # Errors
/// - `InvalidWidth` if `access_width` is not 1, 2 or 4
/// - `OutOfRange` if the access does not fit inside the window
pub fn resolve(device: &MappedDevice, relative_offset: u32, access_width: u8) -> Result<u32> {
    let width = AccessWidth::try_from(access_width)?;
    resolve_width(device, relative_offset, width)
}

/// [`resolve`] for an already validated width
pub fn resolve_width(device: &MappedDevice, relative_offset: u32, width: AccessWidth) -> Result<u32> {
    if u64::from(relative_offset) + u64::from(width.bytes()) > u64::from(device.range) {
        return Err(FmemError::OutOfRange {
            offset: relative_offset,
            width: width.bytes(),
            range: device.range,
        });
    }

    Ok(device.base_addr.wrapping_add(relative_offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    const UART0: MappedDevice = MappedDevice::new("uart0", 0x3000, 0x1000);

    #[test]
    fn test_resolve_adds_base() {
        assert_eq!(resolve(&UART0, 0, 4).unwrap(), 0x3000);
        assert_eq!(resolve(&UART0, 0x10, 1).unwrap(), 0x3010);
    }

    #[test]
    fn test_resolve_boundary() {
        for width in AccessWidth::ALL {
            let last = UART0.range - width.bytes();
            assert_eq!(
                resolve_width(&UART0, last, width).unwrap(),
                0x3000 + last
            );
            assert!(matches!(
                resolve_width(&UART0, last + 1, width),
                Err(FmemError::OutOfRange { .. })
            ));
        }
    }

    #[test]
    fn test_resolve_rejects_bad_width() {
        for width in [0u8, 3, 5, 8, 255] {
            assert!(matches!(
                resolve(&UART0, 0, width),
                Err(FmemError::InvalidWidth { .. })
            ));
        }
    }

    #[test]
    fn test_width_checked_before_range() {
        // Out of range *and* bad width reports the width
        assert!(matches!(
            resolve(&UART0, 0xFFFF_FFFF, 3),
            Err(FmemError::InvalidWidth { width: 3 })
        ));
    }

    #[test]
    fn test_huge_offset_does_not_overflow() {
        assert!(matches!(
            resolve(&UART0, u32::MAX, 4),
            Err(FmemError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_resolve_wraps_at_32_bits() {
        let top = MappedDevice::new("top", 0xFFFF_FFF0, 0x100);
        assert_eq!(resolve(&top, 0x20, 4).unwrap(), 0x0000_0010);
    }

    #[test]
    fn test_size_codes() {
        assert_eq!(AccessWidth::Byte.size_code(), 0);
        assert_eq!(AccessWidth::Half.size_code(), 1);
        assert_eq!(AccessWidth::Word.size_code(), 2);
    }
}
