//! AXI4 flits - one record per channel beat
//!
//! Multi-byte fields are byte vectors whose lengths come from the owning bus
//! domain's field widths (address, data, id and user widths differ between
//! domains). All multi-byte values are little-endian.

use core::fmt;

use bitflags::bitflags;

use crate::Channel;

bitflags! {
    /// AxCACHE memory attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AxCache: u8 {
        const BUFFERABLE = 0b0001;
        const MODIFIABLE = 0b0010;
        const READ_ALLOCATE = 0b0100;
        const WRITE_ALLOCATE = 0b1000;
    }
}

bitflags! {
    /// AxPROT protection attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AxProt: u8 {
        const PRIVILEGED = 0b001;
        const NON_SECURE = 0b010;
        const INSTRUCTION = 0b100;
    }
}

/// xRESP completion code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Resp {
    #[default]
    Okay = 0b00,
    ExOkay = 0b01,
    SlvErr = 0b10,
    DecErr = 0b11,
}

impl Resp {
    /// Decode the low two bits of a raw response field
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Resp::Okay,
            0b01 => Resp::ExOkay,
            0b10 => Resp::SlvErr,
            _ => Resp::DecErr,
        }
    }

    /// OKAY and EXOKAY are successful completions
    pub const fn is_ok(self) -> bool {
        matches!(self, Resp::Okay | Resp::ExOkay)
    }
}

/// Address-phase flit, shared by the AW and AR channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrFlit {
    pub id: Vec<u8>,
    /// Target address, little-endian, one byte per 8 bits of address field
    pub addr: Vec<u8>,
    /// Burst length minus one
    pub len: u8,
    /// log2 of bytes per beat
    pub size: u8,
    pub burst: u8,
    pub lock: bool,
    pub cache: AxCache,
    pub prot: AxProt,
    pub qos: u8,
    pub region: u8,
    pub user: Vec<u8>,
}

impl AddrFlit {
    /// Address as an integer (up to 64 address bits)
    pub fn addr_value(&self) -> u64 {
        le_value(&self.addr)
    }
}

/// Data-write flit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WFlit {
    /// Beat payload, one entry per byte lane
    pub data: Vec<u8>,
    /// Write strobe, bit i of the little-endian mask enables byte lane i
    pub strb: Vec<u8>,
    pub last: bool,
    pub user: Vec<u8>,
}

impl WFlit {
    /// True if byte lane `lane` is write-enabled
    pub fn lane_enabled(&self, lane: usize) -> bool {
        self.strb
            .get(lane / 8)
            .is_some_and(|byte| byte & (1 << (lane % 8)) != 0)
    }
}

/// Write-response flit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BFlit {
    pub id: Vec<u8>,
    pub resp: Resp,
    pub user: Vec<u8>,
}

/// Data-read flit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RFlit {
    pub id: Vec<u8>,
    pub data: Vec<u8>,
    pub resp: Resp,
    pub last: bool,
    pub user: Vec<u8>,
}

/// A flit on any of the five channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flit {
    Aw(AddrFlit),
    W(WFlit),
    B(BFlit),
    Ar(AddrFlit),
    R(RFlit),
}

impl Flit {
    /// Channel this flit travels on
    pub fn channel(&self) -> Channel {
        match self {
            Flit::Aw(_) => Channel::Aw,
            Flit::W(_) => Channel::W,
            Flit::B(_) => Channel::B,
            Flit::Ar(_) => Channel::Ar,
            Flit::R(_) => Channel::R,
        }
    }
}

/// Little-endian byte vector to integer, ignoring bytes past the eighth
fn le_value(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(8)
        .enumerate()
        .fold(0u64, |acc, (i, b)| acc | (u64::from(*b) << (8 * i)))
}

/// Hex dump of a little-endian field, most significant byte first
struct Hex<'a>(&'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        if self.0.is_empty() {
            return f.write_str("0");
        }
        for byte in self.0.iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Display for AddrFlit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {}, addr: {}, len: {}, size: {}, burst: {}, lock: {}, cache: {:#x}, prot: {:#x}, qos: {}, region: {}, user: {}",
            Hex(&self.id),
            Hex(&self.addr),
            self.len,
            self.size,
            self.burst,
            u8::from(self.lock),
            self.cache.bits(),
            self.prot.bits(),
            self.qos,
            self.region,
            Hex(&self.user),
        )
    }
}

impl fmt::Display for WFlit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "data: {}, strb: {}, last: {}, user: {}",
            Hex(&self.data),
            Hex(&self.strb),
            u8::from(self.last),
            Hex(&self.user),
        )
    }
}

impl fmt::Display for BFlit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {}, resp: {:?}, user: {}",
            Hex(&self.id),
            self.resp,
            Hex(&self.user),
        )
    }
}

impl fmt::Display for RFlit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {}, data: {}, resp: {:?}, last: {}, user: {}",
            Hex(&self.id),
            Hex(&self.data),
            self.resp,
            u8::from(self.last),
            Hex(&self.user),
        )
    }
}

impl fmt::Display for Flit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flit::Aw(flit) | Flit::Ar(flit) => write!(f, "{} {{ {} }}", self.channel(), flit),
            Flit::W(flit) => write!(f, "w {{ {} }}", flit),
            Flit::B(flit) => write!(f, "b {{ {} }}", flit),
            Flit::R(flit) => write!(f, "r {{ {} }}", flit),
        }
    }
}
