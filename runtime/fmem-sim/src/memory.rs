//! Sparse beat memory
//!
//! Byte-granular storage addressed in whole beats. Unwritten bytes read as
//! zero. An optional set of decode windows limits which addresses respond;
//! anything outside them is a decode error.

use std::collections::BTreeMap;
use std::ops::Range;

use fmem_port::Resp;

/// Strobe-honouring memory for one data width
#[derive(Debug, Clone)]
pub struct BeatMemory {
    beat_bytes: usize,
    bytes: BTreeMap<u64, u8>,
    windows: Vec<Range<u64>>,
}

impl BeatMemory {
    /// Memory answering every address with `beat_bytes`-wide beats
    ///
    /// # Panics
    /// Panics if `beat_bytes` is not a power of two
    pub fn new(beat_bytes: usize) -> Self {
        assert!(beat_bytes.is_power_of_two(), "beat width must be a power of two");
        Self {
            beat_bytes,
            bytes: BTreeMap::new(),
            windows: Vec::new(),
        }
    }

    /// Restrict decoding to `window`; may be called more than once
    pub fn with_window(mut self, window: Range<u64>) -> Self {
        self.windows.push(window);
        self
    }

    pub fn beat_bytes(&self) -> usize {
        self.beat_bytes
    }

    /// Store `bytes` starting at `addr`, bypassing the bus
    pub fn seed(&mut self, addr: u64, bytes: &[u8]) {
        for (i, byte) in bytes.iter().enumerate() {
            self.bytes.insert(addr + i as u64, *byte);
        }
    }

    /// Byte at `addr`, zero if never written
    pub fn peek(&self, addr: u64) -> u8 {
        self.bytes.get(&addr).copied().unwrap_or(0)
    }

    /// Number of bytes ever written
    pub fn populated(&self) -> usize {
        self.bytes.len()
    }

    fn decodes(&self, addr: u64) -> bool {
        self.windows.is_empty() || self.windows.iter().any(|w| w.contains(&addr))
    }

    fn beat_base(&self, addr: u64) -> u64 {
        addr & !(self.beat_bytes as u64 - 1)
    }

    /// Read the beat containing `addr`
    pub fn read_beat(&self, addr: u64) -> (Vec<u8>, Resp) {
        if !self.decodes(addr) {
            return (vec![0; self.beat_bytes], Resp::DecErr);
        }
        let base = self.beat_base(addr);
        let data = (0..self.beat_bytes as u64).map(|i| self.peek(base + i)).collect();
        (data, Resp::Okay)
    }

    /// Write the enabled lanes of one beat containing `addr`
    ///
    /// `strb` is little-endian; bit i enables byte lane i.
    pub fn write_beat(&mut self, addr: u64, data: &[u8], strb: &[u8]) -> Resp {
        if !self.decodes(addr) {
            return Resp::DecErr;
        }
        let base = self.beat_base(addr);
        for (lane, byte) in data.iter().enumerate().take(self.beat_bytes) {
            let enabled = strb
                .get(lane / 8)
                .is_some_and(|bits| bits & (1 << (lane % 8)) != 0);
            if enabled {
                self.bytes.insert(base + lane as u64, *byte);
            }
        }
        Resp::Okay
    }
}
