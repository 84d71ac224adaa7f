//! Transport wrapper recording the order of accepted sends

use std::sync::{Arc, Mutex};

use fmem_port::{Channel, Flit, Transport};

/// One accepted send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sent {
    pub channel: Channel,
    /// Target address of AW/AR flits
    pub addr: Option<u64>,
}

/// Shared, cloneable view of a recording
#[derive(Debug, Clone, Default)]
pub struct SendLog {
    entries: Arc<Mutex<Vec<Sent>>>,
}

impl SendLog {
    /// Snapshot of every accepted send so far, oldest first
    pub fn entries(&self) -> Vec<Sent> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Channels of every accepted send, oldest first
    pub fn channels(&self) -> Vec<Channel> {
        self.entries().iter().map(|sent| sent.channel).collect()
    }

    fn push(&self, sent: Sent) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(sent);
    }
}

/// Wraps a transport and records accepted sends
pub struct RecordingTransport<T> {
    inner: T,
    log: SendLog,
}

impl<T: Transport> RecordingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            log: SendLog::default(),
        }
    }

    /// Handle onto the recording, usable after the transport is moved away
    pub fn log(&self) -> SendLog {
        self.log.clone()
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Transport> Transport for RecordingTransport<T> {
    fn try_send(&self, flit: Flit) -> Result<(), Flit> {
        let sent = Sent {
            channel: flit.channel(),
            addr: match &flit {
                Flit::Aw(a) | Flit::Ar(a) => Some(a.addr_value()),
                _ => None,
            },
        };
        self.inner.try_send(flit)?;
        self.log.push(sent);
        Ok(())
    }

    fn try_receive(&self, channel: Channel) -> Option<Flit> {
        self.inner.try_receive(channel)
    }
}
