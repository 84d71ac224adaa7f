//! Inline transport answering from a [`Subordinate`] on the caller's thread

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use fmem_port::{Channel, Flit, Resp, Transport};

use crate::memory::BeatMemory;
use crate::subordinate::Subordinate;

struct Inner {
    subordinate: Subordinate,
    b: VecDeque<Flit>,
    r: VecDeque<Flit>,
    reject_sends: u32,
}

/// Synchronous loopback to a simulated subordinate
///
/// A write beat stored by the subordinate is reflected verbatim by the next
/// read of the same beat.
pub struct LoopbackTransport {
    inner: Mutex<Inner>,
}

impl LoopbackTransport {
    /// Loopback over an unrestricted memory with `beat_bytes` wide beats
    pub fn new(beat_bytes: usize) -> Self {
        Self::with_subordinate(Subordinate::new(BeatMemory::new(beat_bytes)))
    }

    pub fn with_subordinate(subordinate: Subordinate) -> Self {
        Self {
            inner: Mutex::new(Inner {
                subordinate,
                b: VecDeque::new(),
                r: VecDeque::new(),
                reject_sends: 0,
            }),
        }
    }

    /// Reject the next `count` sends as if the channel were full
    pub fn reject_sends(self, count: u32) -> Self {
        self.lock().reject_sends = count;
        self
    }

    /// Answer every transaction with `resp`
    pub fn respond_with(self, resp: Resp) -> Self {
        self.lock().subordinate.set_response(Some(resp));
        self
    }

    /// Inspect the subordinate
    pub fn with_subordinate_ref<R>(&self, f: impl FnOnce(&Subordinate) -> R) -> R {
        f(&self.lock().subordinate)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for LoopbackTransport {
    fn try_send(&self, flit: Flit) -> Result<(), Flit> {
        let mut inner = self.lock();
        if !flit.channel().is_request() {
            return Err(flit);
        }
        if inner.reject_sends > 0 {
            inner.reject_sends -= 1;
            return Err(flit);
        }

        if let Some(response) = inner.subordinate.accept(flit) {
            match response.channel() {
                Channel::B => inner.b.push_back(response),
                _ => inner.r.push_back(response),
            }
        }
        Ok(())
    }

    fn try_receive(&self, channel: Channel) -> Option<Flit> {
        let mut inner = self.lock();
        match channel {
            Channel::B => inner.b.pop_front(),
            Channel::R => inner.r.pop_front(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmem_port::{AddrFlit, AxCache, AxProt};

    fn ar(addr: u32) -> Flit {
        Flit::Ar(AddrFlit {
            id: vec![0],
            addr: addr.to_le_bytes().to_vec(),
            len: 0,
            size: 2,
            burst: 0,
            lock: false,
            cache: AxCache::empty(),
            prot: AxProt::empty(),
            qos: 0,
            region: 0,
            user: vec![0],
        })
    }

    #[test]
    fn test_read_answers_inline() {
        let lb = LoopbackTransport::new(16);
        assert!(lb.try_receive(Channel::R).is_none());
        assert!(lb.try_send(ar(0x8000_0000)).is_ok());
        let Some(Flit::R(r)) = lb.try_receive(Channel::R) else {
            panic!("expected an R flit");
        };
        assert_eq!(r.data.len(), 16);
        assert!(lb.try_receive(Channel::R).is_none());
    }

    #[test]
    fn test_rejections_are_counted_down() {
        let lb = LoopbackTransport::new(4).reject_sends(2);
        assert!(lb.try_send(ar(0)).is_err());
        assert!(lb.try_send(ar(0)).is_err());
        assert!(lb.try_send(ar(0)).is_ok());
        assert_eq!(lb.with_subordinate_ref(|s| s.served()), 1);
    }

    #[test]
    fn test_forced_response() {
        let lb = LoopbackTransport::new(4).respond_with(Resp::DecErr);
        lb.try_send(ar(0)).unwrap();
        assert!(matches!(
            lb.try_receive(Channel::R),
            Some(Flit::R(r)) if r.resp == Resp::DecErr
        ));
    }

    #[test]
    fn test_refuses_response_channels() {
        let lb = LoopbackTransport::new(4);
        let b = Flit::B(fmem_port::BFlit {
            id: vec![0],
            resp: Resp::Okay,
            user: vec![0],
        });
        assert!(lb.try_send(b).is_err());
        assert!(lb.try_receive(Channel::Aw).is_none());
    }
}
