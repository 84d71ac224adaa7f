//! Transaction Engine - single-beat AXI4 reads and writes
//!
//! # Read
//! ```text
//! build AR ─> send AR ─> await R ─> extract lanes
//! ```
//!
//! # Write
//! ```text
//! build AW ─> send AW ─> build W ─> send W ─> await B
//! ```
//!
//! Every step that waits on the transport retries a non-blocking primitive
//! under a [`RetryPolicy`]. The engine holds no lock: callers must keep other
//! transactions off the same transport for a whole cycle (see
//! [`crate::BusMux`]).
//!
//! Transaction ids are all zero, so responses pair with requests by order
//! alone. A cycle that times out after its first flit was accepted leaves
//! the transport owing flits; [`Outstanding`] records them and
//! [`Engine::settle`] clears them before the transport carries another
//! cycle.

use std::time::{Duration, Instant};

use crossbeam::utils::Backoff;
use fmem_port::{Channel, Flit, RFlit, Resp, Transport};
use serde::Deserialize;

use crate::domain::BusDomain;
use crate::lane::Lanes;
use crate::{FmemError, Result};

/// How long to keep retrying a full or empty channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry forever; an unresponsive subordinate stalls the caller
    Unbounded,
    /// Give up after this many attempts
    Attempts(u64),
    /// Give up once this much time has passed since the first attempt
    Deadline(Duration),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Deadline(Duration::from_secs(1))
    }
}

/// What to do with a non-OKAY completion code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponsePolicy {
    /// Do not inspect completion codes
    #[default]
    Ignore,
    /// Fail the transaction with `FmemError::BusError`
    Check,
}

/// Engine behaviour shared by all domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    pub response: ResponsePolicy,
}

/// Retry state for one blocking step
struct Retry {
    policy: RetryPolicy,
    attempts: u64,
    started: Instant,
    backoff: Backoff,
}

impl Retry {
    fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            started: Instant::now(),
            backoff: Backoff::new(),
        }
    }

    /// Record a failed attempt; false once the policy is exhausted
    fn again(&mut self) -> bool {
        self.attempts += 1;
        let more = match self.policy {
            RetryPolicy::Unbounded => true,
            RetryPolicy::Attempts(max) => self.attempts < max,
            RetryPolicy::Deadline(limit) => self.started.elapsed() < limit,
        };
        if more {
            self.backoff.snooze();
        }
        more
    }
}

/// Flits still owed by cycles abandoned on a timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Outstanding {
    /// Write data for an accepted AW
    pub w: u32,
    /// Write responses
    pub b: u32,
    /// Read responses
    pub r: u32,
}

impl Outstanding {
    pub fn is_clear(&self) -> bool {
        *self == Outstanding::default()
    }

    /// Account for a failed cycle
    ///
    /// Only a timeout after the cycle's address flit was accepted leaves
    /// anything behind; every other error consumed or never issued its
    /// flits.
    pub fn record(&mut self, err: &FmemError) {
        if let FmemError::Timeout { channel, .. } = err {
            match channel {
                Channel::W => {
                    self.w += 1;
                    self.b += 1;
                }
                Channel::B => self.b += 1,
                Channel::R => self.r += 1,
                Channel::Aw | Channel::Ar => {}
            }
        }
    }
}

/// Transaction engine bound to one domain and its transport
pub struct Engine<'a, T: Transport + ?Sized> {
    domain: BusDomain,
    transport: &'a T,
    config: EngineConfig,
}

impl<'a, T: Transport + ?Sized> Engine<'a, T> {
    pub fn new(domain: BusDomain, transport: &'a T, config: EngineConfig) -> Self {
        Self {
            domain,
            transport,
            config,
        }
    }

    /// Single-beat read of `lanes.width` bytes at `addr`
    ///
    /// # Returns
    /// The value read, zero-extended to 32 bits
    ///
    /// # Errors
    /// - `Timeout` if the transport stays unavailable past the retry policy
    /// - `BusError` for an error response under `ResponsePolicy::Check`
    /// - `Protocol` if the response is malformed
    pub fn read(&self, addr: u32, lanes: &Lanes) -> Result<u32> {
        log::debug!(
            "[{}] read {:#010x} size {} lane {}",
            self.domain,
            addr,
            lanes.size,
            lanes.offset
        );

        self.send(self.domain.ar_flit(addr, lanes))?;

        let rflit = match self.receive(Channel::R)? {
            Flit::R(rflit) => rflit,
            other => return Err(self.unexpected(Channel::R, &other)),
        };
        self.check_response(rflit.resp)?;

        self.extract(&rflit, lanes)
    }

    /// Single-beat write of the low `lanes.width` bytes of `value` at `addr`
    ///
    /// # Errors
    /// Same as [`Engine::read`]
    pub fn write(&self, addr: u32, lanes: &Lanes, value: u32) -> Result<()> {
        log::debug!(
            "[{}] write {:#010x} size {} lane {} value {:#x}",
            self.domain,
            addr,
            lanes.size,
            lanes.offset,
            value
        );

        self.send(self.domain.aw_flit(addr, lanes))?;
        self.send(self.domain.w_flit(lanes, value))?;

        let bflit = match self.receive(Channel::B)? {
            Flit::B(bflit) => bflit,
            other => return Err(self.unexpected(Channel::B, &other)),
        };
        self.check_response(bflit.resp)
    }

    /// Finish the cycles recorded in `owed`
    ///
    /// An AW left without data gets a W with no lane enabled, so the
    /// subordinate writes nothing. Owed B and R flits are received and
    /// dropped. `owed` keeps whatever could not be settled.
    ///
    /// # Errors
    /// `Timeout` if the transport stays unavailable past the retry policy
    pub fn settle(&self, owed: &mut Outstanding) -> Result<()> {
        while owed.w > 0 {
            self.send(self.domain.idle_w_flit())?;
            owed.w -= 1;
        }
        while owed.b > 0 {
            let stale = self.receive(Channel::B)?;
            log::warn!("[{}] dropped late {}", self.domain, stale);
            owed.b -= 1;
        }
        while owed.r > 0 {
            let stale = self.receive(Channel::R)?;
            log::warn!("[{}] dropped late {}", self.domain, stale);
            owed.r -= 1;
        }
        Ok(())
    }

    fn send(&self, flit: Flit) -> Result<()> {
        let channel = flit.channel();
        log::trace!("[{}] >> {}", self.domain, flit);

        let mut retry = Retry::new(self.config.retry);
        let mut pending = flit;
        loop {
            match self.transport.try_send(pending) {
                Ok(()) => return Ok(()),
                Err(rejected) => pending = rejected,
            }
            if !retry.again() {
                return Err(self.timeout(channel));
            }
        }
    }

    fn receive(&self, channel: Channel) -> Result<Flit> {
        let mut retry = Retry::new(self.config.retry);
        loop {
            if let Some(flit) = self.transport.try_receive(channel) {
                log::trace!("[{}] << {}", self.domain, flit);
                return Ok(flit);
            }
            if !retry.again() {
                return Err(self.timeout(channel));
            }
        }
    }

    fn check_response(&self, resp: Resp) -> Result<()> {
        if resp.is_ok() {
            return Ok(());
        }
        match self.config.response {
            ResponsePolicy::Ignore => {
                log::warn!("[{}] ignoring {:?} response", self.domain, resp);
                Ok(())
            }
            ResponsePolicy::Check => Err(FmemError::BusError {
                domain: self.domain.name(),
                resp,
            }),
        }
    }

    fn extract(&self, rflit: &RFlit, lanes: &Lanes) -> Result<u32> {
        let bytes = rflit.data.get(lanes.bytes()).ok_or_else(|| FmemError::Protocol {
            domain: self.domain.name(),
            reason: format!(
                "read beat of {} bytes has no lane {}..{}",
                rflit.data.len(),
                lanes.bytes().start,
                lanes.bytes().end
            ),
        })?;

        let mut value = [0u8; 4];
        value[..bytes.len()].copy_from_slice(bytes);
        Ok(u32::from_le_bytes(value))
    }

    fn timeout(&self, channel: Channel) -> FmemError {
        log::error!("[{}] gave up waiting on channel {}", self.domain, channel);
        FmemError::Timeout {
            domain: self.domain.name(),
            channel,
        }
    }

    fn unexpected(&self, expected: Channel, got: &Flit) -> FmemError {
        FmemError::Protocol {
            domain: self.domain.name(),
            reason: format!("expected {} flit, got {}", expected, got.channel()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::AccessWidth;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// Answers every request with a canned response and counts rejections
    struct Canned {
        responses: RefCell<VecDeque<Flit>>,
        sent: RefCell<Vec<Flit>>,
        reject_sends: Cell<u32>,
    }

    impl Canned {
        fn new(responses: Vec<Flit>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                sent: RefCell::new(Vec::new()),
                reject_sends: Cell::new(0),
            }
        }
    }

    impl Transport for Canned {
        fn try_send(&self, flit: Flit) -> core::result::Result<(), Flit> {
            if self.reject_sends.get() > 0 {
                self.reject_sends.set(self.reject_sends.get() - 1);
                return Err(flit);
            }
            self.sent.borrow_mut().push(flit);
            Ok(())
        }

        fn try_receive(&self, channel: Channel) -> Option<Flit> {
            let mut responses = self.responses.borrow_mut();
            match responses.front() {
                Some(flit) if flit.channel() == channel => responses.pop_front(),
                _ => None,
            }
        }
    }

    fn data_beat(domain: BusDomain, bytes: &[(usize, u8)], resp: Resp) -> Flit {
        let mut flit = domain.r_flit(resp);
        if let Flit::R(r) = &mut flit {
            for (i, b) in bytes {
                r.data[*i] = *b;
            }
        }
        flit
    }

    fn config(retry: RetryPolicy, response: ResponsePolicy) -> EngineConfig {
        EngineConfig { retry, response }
    }

    #[test]
    fn test_read_extracts_lane() {
        let domain = BusDomain::Data;
        let beat = data_beat(domain, &[(4, 0x78), (5, 0x56), (6, 0x34), (7, 0x12)], Resp::Okay);
        let transport = Canned::new(vec![beat]);
        let engine = Engine::new(domain, &transport, EngineConfig::default());

        let lanes = Lanes::new(0xC000_0004, AccessWidth::Word, 0xF);
        assert_eq!(engine.read(0xC000_0004, &lanes).unwrap(), 0x1234_5678);

        let sent = transport.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert!(matches!(&sent[0], Flit::Ar(ar) if ar.addr_value() == 0xC000_0004 && ar.size == 2));
    }

    #[test]
    fn test_read_byte_is_zero_extended() {
        let domain = BusDomain::Control;
        let beat = data_beat(domain, &[(2, 0xAA), (3, 0xBB)], Resp::Okay);
        let transport = Canned::new(vec![beat]);
        let engine = Engine::new(domain, &transport, EngineConfig::default());

        let lanes = Lanes::new(0x3003, AccessWidth::Byte, 0x3);
        assert_eq!(engine.read(0x3003, &lanes).unwrap(), 0xBB);
    }

    #[test]
    fn test_write_sends_aw_then_w() {
        let domain = BusDomain::Control;
        let transport = Canned::new(vec![domain.b_flit(Resp::Okay)]);
        let engine = Engine::new(domain, &transport, EngineConfig::default());

        let lanes = Lanes::new(0x4000, AccessWidth::Word, 0x3);
        engine.write(0x4000, &lanes, 0xCAFE_F00D).unwrap();

        let sent = transport.sent.borrow();
        let channels: Vec<_> = sent.iter().map(Flit::channel).collect();
        assert_eq!(channels, [Channel::Aw, Channel::W]);
        assert!(matches!(&sent[1], Flit::W(w) if w.data == [0x0D, 0xF0, 0xFE, 0xCA] && w.strb == [0xF] && w.last));
    }

    #[test]
    fn test_error_response_ignored_by_default() {
        let domain = BusDomain::Control;
        let transport = Canned::new(vec![
            domain.b_flit(Resp::SlvErr),
            data_beat(domain, &[(0, 0x5A)], Resp::DecErr),
        ]);
        let engine = Engine::new(domain, &transport, EngineConfig::default());
        let lanes = Lanes::new(0x0, AccessWidth::Byte, 0x3);

        assert!(engine.write(0x0, &lanes, 1).is_ok());
        assert_eq!(engine.read(0x0, &lanes).unwrap(), 0x5A);
    }

    #[test]
    fn test_error_response_checked() {
        let domain = BusDomain::Data;
        let transport = Canned::new(vec![domain.b_flit(Resp::DecErr)]);
        let engine = Engine::new(
            domain,
            &transport,
            config(RetryPolicy::default(), ResponsePolicy::Check),
        );
        let lanes = Lanes::new(0x8000_0000, AccessWidth::Word, 0xF);

        let err = engine.write(0x8000_0000, &lanes, 7).unwrap_err();
        assert!(matches!(
            err,
            FmemError::BusError { domain: "h2f", resp: Resp::DecErr }
        ));
    }

    #[test]
    fn test_send_retries_until_accepted() {
        let domain = BusDomain::Control;
        let transport = Canned::new(vec![domain.b_flit(Resp::Okay)]);
        transport.reject_sends.set(5);
        let engine = Engine::new(
            domain,
            &transport,
            config(RetryPolicy::Attempts(10), ResponsePolicy::Ignore),
        );

        let lanes = Lanes::new(0x0, AccessWidth::Word, 0x3);
        engine.write(0x0, &lanes, 1).unwrap();
        assert_eq!(transport.sent.borrow().len(), 2);
    }

    #[test]
    fn test_attempts_exhausted() {
        let domain = BusDomain::Control;
        let transport = Canned::new(vec![]);
        transport.reject_sends.set(3);
        let engine = Engine::new(
            domain,
            &transport,
            config(RetryPolicy::Attempts(3), ResponsePolicy::Ignore),
        );

        let lanes = Lanes::new(0x0, AccessWidth::Word, 0x3);
        let err = engine.read(0x0, &lanes).unwrap_err();
        assert!(matches!(
            err,
            FmemError::Timeout { domain: "h2f_lw", channel: Channel::Ar }
        ));
        assert!(transport.sent.borrow().is_empty());
    }

    #[test]
    fn test_missing_response_times_out() {
        let domain = BusDomain::Data;
        let transport = Canned::new(vec![]);
        let engine = Engine::new(
            domain,
            &transport,
            config(
                RetryPolicy::Deadline(Duration::from_millis(20)),
                ResponsePolicy::Ignore,
            ),
        );

        let lanes = Lanes::new(0x8000_0000, AccessWidth::Word, 0xF);
        let started = Instant::now();
        let err = engine.read(0x8000_0000, &lanes).unwrap_err();
        assert!(matches!(err, FmemError::Timeout { channel: Channel::R, .. }));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_outstanding_records_abandoned_steps() {
        let mut owed = Outstanding::default();
        for channel in Channel::ALL {
            owed.record(&FmemError::Timeout { domain: "h2f", channel });
        }
        owed.record(&FmemError::BusError { domain: "h2f", resp: Resp::SlvErr });
        assert_eq!(owed, Outstanding { w: 1, b: 2, r: 1 });
    }

    #[test]
    fn test_settle_drops_late_read_beat() {
        let domain = BusDomain::Control;
        let transport = Canned::new(vec![
            data_beat(domain, &[(0, 0xAA)], Resp::Okay),
            data_beat(domain, &[(0, 0xBB)], Resp::Okay),
        ]);
        let engine = Engine::new(domain, &transport, EngineConfig::default());

        let mut owed = Outstanding { w: 0, b: 0, r: 1 };
        engine.settle(&mut owed).unwrap();
        assert!(owed.is_clear());

        let lanes = Lanes::new(0x3000, AccessWidth::Byte, 0x3);
        assert_eq!(engine.read(0x3000, &lanes).unwrap(), 0xBB);
    }

    #[test]
    fn test_settle_completes_orphaned_address() {
        let domain = BusDomain::Data;
        let transport = Canned::new(vec![domain.b_flit(Resp::Okay)]);
        let engine = Engine::new(domain, &transport, EngineConfig::default());

        let mut owed = Outstanding { w: 1, b: 1, r: 0 };
        engine.settle(&mut owed).unwrap();
        assert!(owed.is_clear());

        let sent = transport.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert!(matches!(&sent[0], Flit::W(w) if w.strb.iter().all(|b| *b == 0) && w.last));
    }

    #[test]
    fn test_settle_keeps_unpaid_debt() {
        let domain = BusDomain::Control;
        let transport = Canned::new(vec![]);
        let engine = Engine::new(
            domain,
            &transport,
            config(RetryPolicy::Attempts(2), ResponsePolicy::Ignore),
        );

        let mut owed = Outstanding { w: 0, b: 0, r: 2 };
        assert!(matches!(
            engine.settle(&mut owed),
            Err(FmemError::Timeout { channel: Channel::R, .. })
        ));
        assert_eq!(owed.r, 2);
    }

    #[test]
    fn test_short_read_beat_is_protocol_error() {
        let domain = BusDomain::Data;
        let short = Flit::R(RFlit {
            id: vec![0],
            data: vec![0; 4],
            resp: Resp::Okay,
            last: true,
            user: vec![0],
        });
        let transport = Canned::new(vec![short]);
        let engine = Engine::new(domain, &transport, EngineConfig::default());

        let lanes = Lanes::new(0x8000_0008, AccessWidth::Word, 0xF);
        assert!(matches!(
            engine.read(0x8000_0008, &lanes),
            Err(FmemError::Protocol { .. })
        ));
    }
}
