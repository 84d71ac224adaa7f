//! fmem Core - Bus transaction translation engine
//!
//! # Purpose
//! Exposes the memory-mapped devices living behind the two FPGA bridge
//! segments (the narrow lightweight control bus and the wide data bus) as
//! named, byte-addressable resources. A request names a resource, an offset,
//! an access width and a direction; the engine turns it into a single-beat
//! AXI4 transaction on the right bus domain and waits for the response.
//!
//! # Integration Points
//! - Depends on: `fmem-port` (descriptors and transport primitives)
//! - Provides to: resource presentation layers, the `fmem` CLI
//! - Transport: one bridge port per bus domain, opened once at start-up
//!
//! # Architecture
//! ```text
//! name ──> BusMux::locate ──> (BusDomain, MappedDevice)
//!            resolve       ──> absolute address (bounds checked)
//!            Lanes         ──> size code, lane offset, strobe
//!            Engine        ──> AR/R or AW/W/B round trip
//! ```
//!
//! # Testing Strategy
//! - Unit tests: resolver, lane calculator, engine against in-module transports
//! - Integration tests: multiplexer against the simulated fabric (`fmem-sim`)
//! - Property tests: resolver bounds, lanes and write/read round trips

use fmem_port::{Channel, PortError, Resp};
use thiserror::Error;

pub mod config;
pub mod device;
pub mod domain;
pub mod engine;
pub mod lane;
pub mod mux;
pub mod request;
pub mod resolve;

pub use config::FmemConfig;
pub use device::{DeviceRegistry, MappedDevice, H2F_DEVICES, H2F_LW_DEVICES};
pub use domain::{BusDomain, DomainParams, H2F, H2F_LW};
pub use engine::{Engine, EngineConfig, Outstanding, ResponsePolicy, RetryPolicy};
pub use lane::Lanes;
pub use mux::{BusMux, Direction, TransactionRequest, TransactionResult};
pub use request::{FmemCommand, FmemRequest, FMEM_READ, FMEM_WRITE};
pub use resolve::{resolve, AccessWidth};

/// Error types for fmem transactions
#[derive(Debug, Error)]
pub enum FmemError {
    #[error("No such device: {name}")]
    NoSuchDevice { name: String },

    #[error("Access out of range: offset {offset:#x} + width {width} exceeds range {range:#x}")]
    OutOfRange { offset: u32, width: u32, range: u32 },

    #[error("Invalid access width: {width} (expected 1, 2 or 4)")]
    InvalidWidth { width: u32 },

    #[error("Timed out on {domain} channel {channel}")]
    Timeout { domain: &'static str, channel: Channel },

    #[error("Bus error on {domain}: {resp:?} response")]
    BusError { domain: &'static str, resp: Resp },

    #[error("Protocol error on {domain}: {reason}")]
    Protocol { domain: &'static str, reason: String },

    #[error("{domain} is out of step after an abandoned transaction; resync required")]
    Desynchronized { domain: &'static str },

    #[error("Unsupported command {cmd:#x}")]
    UnsupportedCommand { cmd: u32 },

    #[error("Port error: {0}")]
    Port(#[from] PortError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = core::result::Result<T, FmemError>;
