//! Bus Domain Multiplexer - route named resources to their bus domain
//!
//! The multiplexer owns one transport per domain. A transport is locked for
//! a whole transaction cycle (AR/R or AW/W/B), so concurrent callers never
//! interleave the sub-steps of two transactions on the same bridge port.
//! Transactions on different domains proceed in parallel.
//!
//! A timeout fails the request it happened in. Whatever that cycle left
//! owing on the port is settled before the next cycle on the domain starts;
//! while it cannot be settled, requests on the domain fail with
//! `Desynchronized` and put nothing on the bus.

use std::sync::{Mutex, MutexGuard};

use fmem_port::{PortBroker, Transport};
use static_assertions::assert_impl_all;

use crate::config::FmemConfig;
use crate::device::MappedDevice;
use crate::domain::BusDomain;
use crate::engine::{Engine, EngineConfig, Outstanding};
use crate::lane::Lanes;
use crate::request::{FmemCommand, FmemRequest};
use crate::resolve::{resolve_width, AccessWidth};
use crate::{FmemError, Result};

/// Transaction direction; a write carries its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write(u32),
}

/// A fully located request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionRequest {
    pub domain: BusDomain,
    pub device: &'static MappedDevice,
    pub relative_offset: u32,
    pub access_width: AccessWidth,
    pub direction: Direction,
}

impl TransactionRequest {
    /// Build a request from a raw access width
    ///
    /// # Errors
    /// `InvalidWidth` if `access_width` is not 1, 2 or 4
    pub fn new(
        domain: BusDomain,
        device: &'static MappedDevice,
        relative_offset: u32,
        access_width: u8,
        direction: Direction,
    ) -> Result<Self> {
        Ok(Self {
            domain,
            device,
            relative_offset,
            access_width: AccessWidth::try_from(access_width)?,
            direction,
        })
    }
}

/// Outcome of an executed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionResult {
    Read { data: u32 },
    Written,
}

type BoxedTransport = Box<dyn Transport + Send>;

struct DomainBinding {
    transport: BoxedTransport,
    owed: Outstanding,
}

impl DomainBinding {
    fn new(transport: BoxedTransport) -> Mutex<Self> {
        Mutex::new(Self {
            transport,
            owed: Outstanding::default(),
        })
    }
}

/// Bus Domain Multiplexer
pub struct BusMux {
    /// Indexed by `BusDomain::index`
    bindings: [Mutex<DomainBinding>; 2],
    config: EngineConfig,
}

assert_impl_all!(BusMux: Send, Sync);

impl BusMux {
    /// Bind a transport to each domain
    ///
    /// # Arguments
    /// * `control` - Transport of the lightweight bridge
    /// * `data` - Transport of the wide bridge
    /// * `config` - Retry and response policies
    pub fn new<C, D>(control: C, data: D, config: EngineConfig) -> Self
    where
        C: Transport + Send + 'static,
        D: Transport + Send + 'static,
    {
        for domain in BusDomain::PRIORITY {
            domain.registry().log_devices(domain.name());
        }

        Self {
            bindings: [
                DomainBinding::new(Box::new(control)),
                DomainBinding::new(Box::new(data)),
            ],
            config,
        }
    }

    /// Open both domain ports under `config.ports_dir`
    ///
    /// # Errors
    /// `Port` if a domain's port has not been established, or `Config` for
    /// an invalid engine section
    pub fn from_broker(broker: &PortBroker, config: &FmemConfig) -> Result<Self> {
        let engine = config.engine_config()?;
        let control = broker.open(config.port_path(BusDomain::Control))?;
        let data = broker.open(config.port_path(BusDomain::Data))?;
        log::info!(
            "opened ports {} and {}",
            control.path().display(),
            data.path().display()
        );

        Ok(Self::new(control, data, engine))
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Find the domain owning `name`
    ///
    /// # Errors
    /// `NoSuchDevice` if no domain's registry has a device called `name`
    pub fn locate(&self, name: &str) -> Result<(BusDomain, &'static MappedDevice)> {
        BusDomain::PRIORITY
            .iter()
            .find_map(|domain| domain.registry().find(name).map(|dev| (*domain, dev)))
            .ok_or_else(|| FmemError::NoSuchDevice {
                name: name.to_string(),
            })
    }

    /// Every device, in domain priority then table order
    pub fn devices(&self) -> impl Iterator<Item = (BusDomain, &'static MappedDevice)> {
        BusDomain::PRIORITY
            .into_iter()
            .flat_map(|domain| domain.registry().list().iter().map(move |dev| (domain, dev)))
    }

    /// Read `access_width` bytes at `offset` of device `name`
    pub fn read(&self, name: &str, offset: u32, access_width: u8) -> Result<u32> {
        let (domain, device) = self.locate(name)?;
        let request = TransactionRequest::new(domain, device, offset, access_width, Direction::Read)?;
        self.cycle(&request, |engine, addr, lanes| engine.read(addr, lanes))
    }

    /// Write the low `access_width` bytes of `value` at `offset` of device `name`
    pub fn write(&self, name: &str, offset: u32, access_width: u8, value: u32) -> Result<()> {
        let (domain, device) = self.locate(name)?;
        let request =
            TransactionRequest::new(domain, device, offset, access_width, Direction::Write(value))?;
        self.cycle(&request, |engine, addr, lanes| engine.write(addr, lanes, value))
    }

    /// Resolve, place and run one request on its domain
    ///
    /// Validation failures return before the transport is touched.
    pub fn execute(&self, request: &TransactionRequest) -> Result<TransactionResult> {
        match request.direction {
            Direction::Read => self
                .cycle(request, |engine, addr, lanes| engine.read(addr, lanes))
                .map(|data| TransactionResult::Read { data }),
            Direction::Write(value) => self
                .cycle(request, |engine, addr, lanes| engine.write(addr, lanes, value))
                .map(|()| TransactionResult::Written),
        }
    }

    /// Flits the domain's port still owes from abandoned cycles
    pub fn outstanding(&self, domain: BusDomain) -> Outstanding {
        self.lock(domain).owed
    }

    /// Serve an fmem request against device `name`
    ///
    /// # Arguments
    /// * `name` - Device name
    /// * `cmd` - Raw command number (`FMEM_READ` or `FMEM_WRITE`)
    /// * `request` - In/out request record; reads store the value in `data`
    pub fn handle_request(&self, name: &str, cmd: u32, request: &mut FmemRequest) -> Result<()> {
        let command = FmemCommand::from_raw(cmd).ok_or(FmemError::UnsupportedCommand { cmd })?;
        let width = u8::try_from(request.access_width).map_err(|_| FmemError::InvalidWidth {
            width: request.access_width,
        })?;

        match command {
            FmemCommand::Read => {
                request.data = self.read(name, request.offset, width)?;
            }
            FmemCommand::Write => {
                self.write(name, request.offset, width, request.data)?;
            }
        }
        Ok(())
    }

    /// Run one transaction cycle with the domain's transport held
    ///
    /// Settles flits owed by earlier abandoned cycles first, and records
    /// what this cycle owes if it is abandoned in turn.
    fn cycle<R>(
        &self,
        request: &TransactionRequest,
        run: impl FnOnce(&Engine<'_, dyn Transport + Send>, u32, &Lanes) -> Result<R>,
    ) -> Result<R> {
        let domain = request.domain;
        let addr = resolve_width(request.device, request.relative_offset, request.access_width)?;
        let lanes = Lanes::new(addr, request.access_width, domain.params().offset_mask());

        let mut binding = self.lock(domain);
        let DomainBinding { transport, owed } = &mut *binding;
        let engine = Engine::new(domain, &**transport, self.config);

        if !owed.is_clear() {
            log::warn!("[{}] settling {:?} before next cycle", domain, owed);
            if let Err(err) = engine.settle(owed) {
                log::error!("[{}] still out of step ({}), {:?} owed", domain, err, owed);
                return Err(FmemError::Desynchronized {
                    domain: domain.name(),
                });
            }
        }

        let result = run(&engine, addr, &lanes);
        if let Err(err) = &result {
            owed.record(err);
        }
        result
    }

    fn lock(&self, domain: BusDomain) -> MutexGuard<'_, DomainBinding> {
        self.bindings[domain.index()]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmem_port::{Channel, Flit};

    /// Transport that must never be used
    struct Untouched;

    impl Transport for Untouched {
        fn try_send(&self, _flit: Flit) -> core::result::Result<(), Flit> {
            panic!("transport used by an invalid request");
        }

        fn try_receive(&self, _channel: Channel) -> Option<Flit> {
            panic!("transport used by an invalid request");
        }
    }

    /// Transport whose channels are always full and empty
    struct Stalled;

    impl Transport for Stalled {
        fn try_send(&self, flit: Flit) -> core::result::Result<(), Flit> {
            Err(flit)
        }

        fn try_receive(&self, _channel: Channel) -> Option<Flit> {
            None
        }
    }

    fn mux() -> BusMux {
        BusMux::new(Untouched, Untouched, EngineConfig::default())
    }

    #[test]
    fn test_data_requests_use_data_transport() {
        let mux = BusMux::new(
            Untouched,
            Stalled,
            EngineConfig {
                retry: crate::RetryPolicy::Attempts(2),
                ..EngineConfig::default()
            },
        );
        assert!(matches!(
            mux.read("ddr_cached", 0, 4),
            Err(FmemError::Timeout { domain: "h2f", channel: Channel::Ar })
        ));
        assert!(mux.outstanding(BusDomain::Data).is_clear());
    }

    #[test]
    fn test_locate_control_device() {
        let (domain, dev) = mux().locate("uart0").unwrap();
        assert_eq!(domain, BusDomain::Control);
        assert_eq!((dev.base_addr, dev.range), (0x3000, 0x1000));
    }

    #[test]
    fn test_locate_data_device() {
        let (domain, dev) = mux().locate("ddr_cached").unwrap();
        assert_eq!(domain, BusDomain::Data);
        assert_eq!((dev.base_addr, dev.range), (0xC000_0000, 0x4000_0000));
    }

    #[test]
    fn test_locate_unknown() {
        assert!(matches!(
            mux().locate("uart2"),
            Err(FmemError::NoSuchDevice { name }) if name == "uart2"
        ));
    }

    #[test]
    fn test_validation_never_touches_transport() {
        let mux = mux();
        assert!(matches!(
            mux.read("nope", 0, 4),
            Err(FmemError::NoSuchDevice { .. })
        ));
        assert!(matches!(
            mux.read("uart0", 0, 3),
            Err(FmemError::InvalidWidth { width: 3 })
        ));
        assert!(matches!(
            mux.write("uart0", 0x1000, 1, 0),
            Err(FmemError::OutOfRange { .. })
        ));
        assert!(matches!(
            mux.write("virtual_device", 0x3FFE, 4, 0),
            Err(FmemError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_devices_enumerates_in_priority_order() {
        let all: Vec<_> = mux().devices().map(|(d, dev)| (d, dev.name)).collect();
        assert_eq!(all.len(), 9);
        assert_eq!(all[0], (BusDomain::Control, "debug_unit"));
        assert_eq!(all[6], (BusDomain::Control, "virtual_device"));
        assert_eq!(all[7], (BusDomain::Data, "ddr_uncached"));
    }

    #[test]
    fn test_request_construction_rejects_width() {
        let dev = BusDomain::Control.registry().find("misc").unwrap();
        assert!(matches!(
            TransactionRequest::new(BusDomain::Control, dev, 0, 8, Direction::Read),
            Err(FmemError::InvalidWidth { width: 8 })
        ));
    }

    #[test]
    fn test_unsupported_command() {
        let mut req = FmemRequest {
            offset: 0,
            data: 0,
            access_width: 4,
        };
        assert!(matches!(
            mux().handle_request("uart0", 0xDEAD, &mut req),
            Err(FmemError::UnsupportedCommand { cmd: 0xDEAD })
        ));
    }
}
