//! Bus domains - the two bridge segments and their descriptor shapes
//!
//! Every domain has its own address, data, id and user field widths. The
//! transaction engine is written once against [`BusDomain`]; the domain
//! supplies correctly sized descriptors for each of the five channels.

use core::fmt;

use fmem_port::{AddrFlit, AxCache, AxProt, BFlit, Channel, Flit, RFlit, Resp, WFlit};
use static_assertions::{const_assert, const_assert_eq};

use crate::device::{DeviceRegistry, H2F_DEVICES, H2F_LW_DEVICES};
use crate::lane::Lanes;

/// AXI4 port parameters of one bus domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainParams {
    pub name: &'static str,
    /// Port folder under the ports directory
    pub folder: &'static str,
    pub id_bits: u32,
    /// Address bits decoded by the fabric
    pub addr_bits: u32,
    /// Width of the address field carried in AW/AR flits
    pub addr_field_bits: u32,
    pub data_bits: u32,
    pub awuser_bits: u32,
    pub wuser_bits: u32,
    pub buser_bits: u32,
    pub aruser_bits: u32,
    pub ruser_bits: u32,
}

impl DomainParams {
    /// Bytes per beat
    pub const fn data_bytes(&self) -> usize {
        (self.data_bits / 8) as usize
    }

    /// Bytes of write strobe per beat
    pub const fn strobe_bytes(&self) -> usize {
        field_bytes(self.data_bits / 8)
    }

    /// Address bits selecting a byte lane inside a beat
    pub const fn offset_mask(&self) -> u32 {
        self.data_bits / 8 - 1
    }

    pub const fn id_bytes(&self) -> usize {
        field_bytes(self.id_bits)
    }

    pub const fn addr_bytes(&self) -> usize {
        field_bytes(self.addr_field_bits)
    }

    /// Bytes of user field carried on `channel`
    pub const fn user_bytes(&self, channel: Channel) -> usize {
        field_bytes(match channel {
            Channel::Aw => self.awuser_bits,
            Channel::W => self.wuser_bits,
            Channel::B => self.buser_bits,
            Channel::Ar => self.aruser_bits,
            Channel::R => self.ruser_bits,
        })
    }
}

/// Bytes needed for a field of `bits` bits; zero-width fields keep one byte
const fn field_bytes(bits: u32) -> usize {
    if bits == 0 {
        1
    } else {
        bits.div_ceil(8) as usize
    }
}

/// Lightweight HPS-to-FPGA bridge (control bus)
pub const H2F_LW: DomainParams = DomainParams {
    name: "h2f_lw",
    folder: "h2f_lw",
    id_bits: 0,
    addr_bits: 21,
    addr_field_bits: 32,
    data_bits: 32,
    awuser_bits: 0,
    wuser_bits: 0,
    buser_bits: 0,
    aruser_bits: 0,
    ruser_bits: 0,
};

/// HPS-to-FPGA bridge (data bus)
pub const H2F: DomainParams = DomainParams {
    name: "h2f",
    folder: "h2f",
    id_bits: 4,
    addr_bits: 32,
    addr_field_bits: 32,
    data_bits: 128,
    awuser_bits: 0,
    wuser_bits: 0,
    buser_bits: 0,
    aruser_bits: 0,
    ruser_bits: 0,
};

const_assert!(H2F_LW.data_bits.is_power_of_two() && H2F_LW.data_bits >= 32);
const_assert!(H2F.data_bits.is_power_of_two() && H2F.data_bits >= 32);
const_assert_eq!(H2F_LW.offset_mask(), 0x3);
const_assert_eq!(H2F.offset_mask(), 0xF);

static CONTROL_REGISTRY: DeviceRegistry = DeviceRegistry::new(H2F_LW_DEVICES);
static DATA_REGISTRY: DeviceRegistry = DeviceRegistry::new(H2F_DEVICES);

/// The bus domains, in lookup priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusDomain {
    /// Narrow, low-latency control bus
    Control,
    /// Wide, high-bandwidth data bus
    Data,
}

impl BusDomain {
    /// Domains in the order names are resolved
    pub const PRIORITY: [BusDomain; 2] = [BusDomain::Control, BusDomain::Data];

    /// Position in [`BusDomain::PRIORITY`]
    pub const fn index(self) -> usize {
        match self {
            BusDomain::Control => 0,
            BusDomain::Data => 1,
        }
    }

    pub const fn params(self) -> &'static DomainParams {
        match self {
            BusDomain::Control => &H2F_LW,
            BusDomain::Data => &H2F,
        }
    }

    pub fn registry(self) -> &'static DeviceRegistry {
        match self {
            BusDomain::Control => &CONTROL_REGISTRY,
            BusDomain::Data => &DATA_REGISTRY,
        }
    }

    pub const fn name(self) -> &'static str {
        self.params().name
    }

    /// Address-write descriptor for a single beat at `addr`
    pub fn aw_flit(self, addr: u32, lanes: &Lanes) -> Flit {
        Flit::Aw(self.addr_flit(addr, lanes, Channel::Aw))
    }

    /// Data-write descriptor carrying `value` in the access's lanes
    pub fn w_flit(self, lanes: &Lanes, value: u32) -> Flit {
        let params = self.params();
        let mut data = vec![0u8; params.data_bytes()];
        let width = lanes.width.bytes() as usize;
        data[lanes.bytes()].copy_from_slice(&value.to_le_bytes()[..width]);

        Flit::W(WFlit {
            data,
            strb: le_bytes(u64::from(lanes.strobe), params.strobe_bytes()),
            last: true,
            user: vec![0; params.user_bytes(Channel::W)],
        })
    }

    /// Data-write descriptor with every lane disabled
    pub fn idle_w_flit(self) -> Flit {
        let params = self.params();
        Flit::W(WFlit {
            data: vec![0; params.data_bytes()],
            strb: vec![0; params.strobe_bytes()],
            last: true,
            user: vec![0; params.user_bytes(Channel::W)],
        })
    }

    /// Write-response descriptor
    pub fn b_flit(self, resp: Resp) -> Flit {
        let params = self.params();
        Flit::B(BFlit {
            id: vec![0; params.id_bytes()],
            resp,
            user: vec![0; params.user_bytes(Channel::B)],
        })
    }

    /// Address-read descriptor for a single beat at `addr`
    pub fn ar_flit(self, addr: u32, lanes: &Lanes) -> Flit {
        Flit::Ar(self.addr_flit(addr, lanes, Channel::Ar))
    }

    /// Data-read descriptor with a zeroed beat
    pub fn r_flit(self, resp: Resp) -> Flit {
        let params = self.params();
        Flit::R(RFlit {
            id: vec![0; params.id_bytes()],
            data: vec![0; params.data_bytes()],
            resp,
            last: true,
            user: vec![0; params.user_bytes(Channel::R)],
        })
    }

    fn addr_flit(self, addr: u32, lanes: &Lanes, channel: Channel) -> AddrFlit {
        let params = self.params();
        AddrFlit {
            id: vec![0; params.id_bytes()],
            addr: le_bytes(u64::from(addr), params.addr_bytes()),
            len: 0,
            size: lanes.size,
            burst: 0,
            lock: false,
            cache: AxCache::empty(),
            prot: AxProt::empty(),
            qos: 0,
            region: 0,
            user: vec![0; params.user_bytes(channel)],
        }
    }
}

impl fmt::Display for BusDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Low `len` bytes of `value`, little-endian, zero-extended past 8 bytes
fn le_bytes(value: u64, len: usize) -> Vec<u8> {
    let mut bytes = value.to_le_bytes().to_vec();
    bytes.resize(len, 0);
    bytes
}
