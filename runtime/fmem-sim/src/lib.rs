//! fmem Simulated Fabric
//!
//! # Purpose
//! Stands in for the FPGA side of the bridge during development and tests.
//! A [`Subordinate`] consumes AW/W/AR flits, applies them to a strobe-aware
//! [`BeatMemory`] and produces B/R responses.
//!
//! # Integration Points
//! - Depends on: `fmem-port` (flits, `Transport`, `FifoPort`)
//! - Provides to: `fmem-core` tests and benches, the `fmem` CLI
//!
//! # Architecture
//! ```text
//! LoopbackTransport ──> Subordinate ──> BeatMemory     (inline, same thread)
//! FifoPort ──> Responder thread ──> Subordinate        (threaded)
//! RecordingTransport<T> ──> T                          (send-order log)
//! ```

pub mod loopback;
pub mod memory;
pub mod recording;
pub mod responder;
pub mod subordinate;

pub use loopback::LoopbackTransport;
pub use memory::BeatMemory;
pub use recording::{RecordingTransport, SendLog, Sent};
pub use responder::Responder;
pub use subordinate::Subordinate;
