//! fmem Port - AXI4 descriptors and non-blocking bridge ports
//!
//! # Purpose
//! Defines the five AXI4 transaction descriptor shapes (address-write,
//! data-write, write-response, address-read, data-read) and the transport
//! contract used to move them between a bus manager and a bus subordinate.
//!
//! # Integration Points
//! - Depends on: nothing outside the crate
//! - Provides to: `fmem-core` (transaction engine), `fmem-sim` (simulated fabric)
//! - Transport primitives: `try_send` / `try_receive`, both non-blocking
//!
//! # Architecture
//! Each bridge port is five bounded lock-free queues, one per AXI4 channel.
//! The manager side produces on AW/W/AR and consumes from B/R; the
//! subordinate side does the opposite. Ports are published by path through
//! the [`PortBroker`] so that the two sides can find each other.
//!
//! Any retry or blocking policy is built by callers on top of the
//! non-blocking primitives; nothing in this crate ever waits.

use core::fmt;
use std::sync::Arc;

pub mod broker;
pub mod fifo;
pub mod flit;

pub use broker::{PortBroker, PortHandle, PortState};
pub use fifo::{FifoPort, Manager, Subordinate};
pub use flit::{AddrFlit, AxCache, AxProt, BFlit, Flit, RFlit, Resp, WFlit};

use thiserror::Error;

/// Port error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("No port at {path}")]
    PortNotFound { path: String },

    #[error("Port already established at {path}")]
    PortExists { path: String },

    #[error("Invalid port capacity {capacity} (must be a non-zero power of 2)")]
    InvalidCapacity { capacity: usize },

    #[error("Port at {path} is closed")]
    PortClosed { path: String },
}

pub type Result<T> = core::result::Result<T, PortError>;

/// AXI4 channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// Address-write
    Aw,
    /// Data-write
    W,
    /// Write-response
    B,
    /// Address-read
    Ar,
    /// Data-read
    R,
}

impl Channel {
    /// All channels, in fifo index order
    pub const ALL: [Channel; 5] = [Channel::Aw, Channel::W, Channel::B, Channel::Ar, Channel::R];

    /// Index of this channel's queue inside a port
    pub const fn index(self) -> usize {
        match self {
            Channel::Aw => 0,
            Channel::W => 1,
            Channel::B => 2,
            Channel::Ar => 3,
            Channel::R => 4,
        }
    }

    /// True for channels driven by the manager (AW, W, AR)
    pub const fn is_request(self) -> bool {
        matches!(self, Channel::Aw | Channel::W | Channel::Ar)
    }

    /// Fifo name of the channel inside a bridge port folder
    pub const fn name(self) -> &'static str {
        match self {
            Channel::Aw => "aw",
            Channel::W => "w",
            Channel::B => "b",
            Channel::Ar => "ar",
            Channel::R => "r",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Non-blocking transport primitives of one bridge port
///
/// Implementations use interior mutability so a single endpoint can be
/// shared by reference. Neither method may block.
pub trait Transport {
    /// Enqueue a flit on `flit.channel()`
    ///
    /// # Errors
    /// Hands the flit back when the channel cannot accept it right now
    /// (full, or not writable from this side of the port).
    fn try_send(&self, flit: Flit) -> core::result::Result<(), Flit>;

    /// Dequeue a flit from `channel`, or `None` if nothing is available
    fn try_receive(&self, channel: Channel) -> Option<Flit>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn try_send(&self, flit: Flit) -> core::result::Result<(), Flit> {
        (**self).try_send(flit)
    }

    fn try_receive(&self, channel: Channel) -> Option<Flit> {
        (**self).try_receive(channel)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn try_send(&self, flit: Flit) -> core::result::Result<(), Flit> {
        (**self).try_send(flit)
    }

    fn try_receive(&self, channel: Channel) -> Option<Flit> {
        (**self).try_receive(channel)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn try_send(&self, flit: Flit) -> core::result::Result<(), Flit> {
        (**self).try_send(flit)
    }

    fn try_receive(&self, channel: Channel) -> Option<Flit> {
        (**self).try_receive(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_indices_are_unique() {
        let mut seen = [false; 5];
        for ch in Channel::ALL {
            assert!(!seen[ch.index()]);
            seen[ch.index()] = true;
        }
    }

    #[test]
    fn test_channel_direction() {
        assert!(Channel::Aw.is_request());
        assert!(Channel::W.is_request());
        assert!(Channel::Ar.is_request());
        assert!(!Channel::B.is_request());
        assert!(!Channel::R.is_request());
        assert_eq!(Channel::Ar.to_string(), "ar");
    }
}
