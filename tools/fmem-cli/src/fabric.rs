//! In-process simulated bridge fabric
//!
//! Establishes one port per bus domain under the configured ports directory
//! and serves each with a responder thread whose memory decodes exactly the
//! domain's device windows.

use anyhow::{Context, Result};
use fmem_core::{BusDomain, BusMux, FmemConfig};
use fmem_port::PortBroker;
use fmem_sim::{BeatMemory, Responder, Subordinate};

pub struct SimFabric {
    broker: PortBroker,
    responders: Vec<Responder>,
}

impl SimFabric {
    pub fn start(config: &FmemConfig) -> Result<Self> {
        let broker = PortBroker::new();
        let mut responders = Vec::with_capacity(BusDomain::PRIORITY.len());

        for domain in BusDomain::PRIORITY {
            let path = config.port_path(domain);
            let port = broker
                .establish(&path, config.port.capacity)
                .with_context(|| format!("Failed to establish port {}", path.display()))?;

            let memory = domain.registry().list().iter().fold(
                BeatMemory::new(domain.params().data_bytes()),
                |memory, dev| memory.with_window(u64::from(dev.base_addr)..dev.end()),
            );
            let responder = Responder::spawn(domain.name(), port, Subordinate::new(memory))
                .with_context(|| format!("Failed to spawn responder for {}", domain))?;
            responders.push(responder);
        }

        log::debug!("simulated fabric up under {}", config.ports_dir.display());
        Ok(Self { broker, responders })
    }

    /// Multiplexer connected to this fabric's ports
    pub fn connect(&self, config: &FmemConfig) -> Result<BusMux> {
        BusMux::from_broker(&self.broker, config).context("Failed to open bridge ports")
    }

    pub fn shutdown(self) {
        for responder in self.responders {
            if let Some(subordinate) = responder.stop() {
                log::debug!("responder served {} transactions", subordinate.served());
            }
        }
    }
}
