//! fmem request ABI - the record and command numbers used by callers
//!
//! Compatible with the Linux `_IOWR('X', nr, struct fmem_request)` encoding,
//! so a presentation layer can forward raw ioctl numbers unchanged.

use core::mem::size_of;

use crate::FmemError;

/// In/out request record
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FmemRequest {
    /// Byte offset inside the device window
    pub offset: u32,
    /// Value to write, or the value read
    pub data: u32,
    /// 1, 2 or 4
    pub access_width: u32,
}

static_assertions::assert_eq_size!(FmemRequest, [u32; 3]);

const IOC_NRBITS: u32 = 8;
const IOC_TYPEBITS: u32 = 8;
const IOC_SIZEBITS: u32 = 14;
const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;
const IOC_READ_WRITE: u32 = 3;

/// `_IOWR(ty, nr, T)` for a record of `size` bytes
const fn iowr(ty: u8, nr: u8, size: usize) -> u32 {
    (IOC_READ_WRITE << IOC_DIRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)
        | ((ty as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
}

const FMEM_MAGIC: u8 = b'X';

pub const FMEM_READ: u32 = iowr(FMEM_MAGIC, 1, size_of::<FmemRequest>());
pub const FMEM_WRITE: u32 = iowr(FMEM_MAGIC, 2, size_of::<FmemRequest>());

/// Decoded command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmemCommand {
    Read,
    Write,
}

impl FmemCommand {
    pub const fn from_raw(cmd: u32) -> Option<Self> {
        match cmd {
            FMEM_READ => Some(FmemCommand::Read),
            FMEM_WRITE => Some(FmemCommand::Write),
            _ => None,
        }
    }

    pub const fn raw(self) -> u32 {
        match self {
            FmemCommand::Read => FMEM_READ,
            FmemCommand::Write => FMEM_WRITE,
        }
    }
}

pub const ENOENT: i32 = 2;
pub const EIO: i32 = 5;
pub const EINVAL: i32 = 22;
pub const ERANGE: i32 = 34;
pub const ETIMEDOUT: i32 = 110;

impl FmemError {
    /// Positive errno reported to callers of the request interface
    pub fn errno(&self) -> i32 {
        match self {
            FmemError::NoSuchDevice { .. } => ENOENT,
            FmemError::OutOfRange { .. } => ERANGE,
            FmemError::InvalidWidth { .. }
            | FmemError::UnsupportedCommand { .. }
            | FmemError::Config(_) => EINVAL,
            FmemError::Timeout { .. } => ETIMEDOUT,
            FmemError::BusError { .. }
            | FmemError::Protocol { .. }
            | FmemError::Desynchronized { .. }
            | FmemError::Port(_) => EIO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmem_port::{Channel, PortError, Resp};

    #[test]
    fn test_command_numbers() {
        assert_eq!(FMEM_READ, 0xC00C_5801);
        assert_eq!(FMEM_WRITE, 0xC00C_5802);
    }

    #[test]
    fn test_command_decode() {
        assert_eq!(FmemCommand::from_raw(FMEM_READ), Some(FmemCommand::Read));
        assert_eq!(FmemCommand::from_raw(FMEM_WRITE), Some(FmemCommand::Write));
        assert_eq!(FmemCommand::from_raw(0), None);
        assert_eq!(FmemCommand::Write.raw(), FMEM_WRITE);
    }

    #[test]
    fn test_errno_mapping() {
        let cases = [
            (FmemError::NoSuchDevice { name: "x".into() }, ENOENT),
            (FmemError::OutOfRange { offset: 0, width: 4, range: 2 }, ERANGE),
            (FmemError::InvalidWidth { width: 3 }, EINVAL),
            (FmemError::Timeout { domain: "h2f", channel: Channel::R }, ETIMEDOUT),
            (FmemError::BusError { domain: "h2f", resp: Resp::SlvErr }, EIO),
            (FmemError::Desynchronized { domain: "h2f_lw" }, EIO),
            (FmemError::Port(PortError::PortNotFound { path: "p".into() }), EIO),
        ];
        for (err, errno) in cases {
            assert_eq!(err.errno(), errno, "{err}");
        }
    }
}
