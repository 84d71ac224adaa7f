//! Subordinate protocol model
//!
//! Pairs write-address and write-data beats in arrival order (either may
//! arrive first) and answers every pair with a B flit. Every AR flit is
//! answered with an R flit. Only single-beat transfers are modelled.

use std::collections::VecDeque;

use fmem_port::{AddrFlit, BFlit, Flit, RFlit, Resp, WFlit};

use crate::memory::BeatMemory;

pub struct Subordinate {
    memory: BeatMemory,
    addresses: VecDeque<AddrFlit>,
    data: VecDeque<WFlit>,
    forced: Option<Resp>,
    served: u64,
}

impl Subordinate {
    pub fn new(memory: BeatMemory) -> Self {
        Self {
            memory,
            addresses: VecDeque::new(),
            data: VecDeque::new(),
            forced: None,
            served: 0,
        }
    }

    /// Answer every transaction with `resp`, after still applying it
    pub fn respond_with(mut self, resp: Resp) -> Self {
        self.set_response(Some(resp));
        self
    }

    /// Override (or with `None`, stop overriding) the response code
    pub fn set_response(&mut self, resp: Option<Resp>) {
        self.forced = resp;
    }

    pub fn memory(&self) -> &BeatMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut BeatMemory {
        &mut self.memory
    }

    /// Completed transactions
    pub fn served(&self) -> u64 {
        self.served
    }

    /// Consume one request flit; returns the response it completes, if any
    pub fn accept(&mut self, flit: Flit) -> Option<Flit> {
        log::trace!("subordinate <- {}", flit);
        match flit {
            Flit::Aw(aw) => {
                self.addresses.push_back(aw);
                self.complete_write()
            }
            Flit::W(w) => {
                self.data.push_back(w);
                self.complete_write()
            }
            Flit::Ar(ar) => Some(self.read(ar)),
            other => {
                log::warn!("subordinate ignoring {} flit", other.channel());
                None
            }
        }
    }

    fn complete_write(&mut self) -> Option<Flit> {
        if self.addresses.is_empty() || self.data.is_empty() {
            return None;
        }
        let aw = self.addresses.pop_front()?;
        let w = self.data.pop_front()?;
        if aw.len != 0 {
            log::warn!("burst length {} truncated to one beat", u32::from(aw.len) + 1);
        }

        let resp = self.memory.write_beat(aw.addr_value(), &w.data, &w.strb);
        self.served += 1;
        Some(Flit::B(BFlit {
            id: aw.id,
            resp: self.forced.unwrap_or(resp),
            user: vec![0],
        }))
    }

    fn read(&mut self, ar: AddrFlit) -> Flit {
        let (data, resp) = self.memory.read_beat(ar.addr_value());
        self.served += 1;
        Flit::R(RFlit {
            id: ar.id,
            data,
            resp: self.forced.unwrap_or(resp),
            last: true,
            user: vec![0],
        })
    }
}
