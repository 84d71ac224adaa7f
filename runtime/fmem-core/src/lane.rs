//! Lane Calculator - size code, byte lane and write strobe
//!
//! A bus domain's beat can be wider than the access (a 4-byte access on a
//! 16-byte beat). The lane offset selects which bytes of the beat carry the
//! value; the strobe enables exactly those bytes on writes.

use core::ops::Range;

use crate::resolve::AccessWidth;

/// AXI4 AxSIZE for an access width
pub const fn size_code(width: AccessWidth) -> u8 {
    width.size_code()
}

/// Byte offset of the access inside its beat
///
/// The address bits selected by `domain_mask`, rounded down to the natural
/// alignment of the access.
pub const fn lane_offset(absolute_addr: u32, width: AccessWidth, domain_mask: u32) -> u32 {
    let align = (1u32 << size_code(width)) - 1;
    (absolute_addr & domain_mask) & !align
}

/// Per-byte write enables for `width` bytes starting at `lane_offset`
pub const fn strobe(width: AccessWidth, lane_offset: u32) -> u32 {
    let run = (1u32 << width.bytes()) - 1;
    run << lane_offset
}

/// Lane placement of one access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lanes {
    pub width: AccessWidth,
    /// AxSIZE
    pub size: u8,
    /// First byte of the access inside the beat
    pub offset: u32,
    pub strobe: u32,
}

impl Lanes {
    /// Place an access at `absolute_addr` on a domain with `domain_mask`
    ///
    /// `domain_mask` is a domain's `offset_mask()`: one less than a beat of
    /// at most 32 bytes, so that every strobe fits in a `u32`.
    pub const fn new(absolute_addr: u32, width: AccessWidth, domain_mask: u32) -> Self {
        debug_assert!(
            domain_mask < 32 && (domain_mask + 1).is_power_of_two(),
            "lane mask must describe a beat of 1 to 32 bytes"
        );
        let offset = lane_offset(absolute_addr, width, domain_mask);
        Self {
            width,
            size: size_code(width),
            offset,
            strobe: strobe(width, offset),
        }
    }

    /// Byte indices of the beat occupied by the access
    pub fn bytes(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.width.bytes() as usize
    }
}
