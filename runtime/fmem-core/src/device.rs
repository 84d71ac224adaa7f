//! Device Registry - named address ranges per bus domain
//!
//! The tables are fixed at build time. A registry is a read-only view over
//! one table; lookups are a linear scan, which is plenty for tables of a few
//! entries.

use core::fmt;

/// A memory-mapped device window on a bus domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedDevice {
    pub name: &'static str,
    pub base_addr: u32,
    pub range: u32,
}

impl MappedDevice {
    /// Describe a device window
    ///
    /// # Panics
    /// Panics if `range` is zero (at compile time for the static tables)
    pub const fn new(name: &'static str, base_addr: u32, range: u32) -> Self {
        assert!(range > 0, "device range must be non-zero");
        Self {
            name,
            base_addr,
            range,
        }
    }

    /// One past the last byte of the window, without wrapping
    pub fn end(&self) -> u64 {
        u64::from(self.base_addr) + u64::from(self.range)
    }
}

impl fmt::Display for MappedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name: {:>15}, base_addr: {:#010x}, range: {:#010x}",
            self.name, self.base_addr, self.range
        )
    }
}

/// Devices behind the lightweight (control) bridge
pub const H2F_LW_DEVICES: &[MappedDevice] = &[
    MappedDevice::new("debug_unit", 0x0000_0000, 0x0000_1000),
    MappedDevice::new("irqs", 0x0000_1000, 0x0000_1000),
    MappedDevice::new("misc", 0x0000_2000, 0x0000_1000),
    MappedDevice::new("uart0", 0x0000_3000, 0x0000_1000),
    MappedDevice::new("uart1", 0x0000_4000, 0x0000_1000),
    MappedDevice::new("h2f_addr_ctrl", 0x0000_5000, 0x0000_1000),
    MappedDevice::new("virtual_device", 0x0000_8000, 0x0000_4000),
];

/// Devices behind the wide (data) bridge
pub const H2F_DEVICES: &[MappedDevice] = &[
    MappedDevice::new("ddr_uncached", 0x8000_0000, 0x4000_0000),
    MappedDevice::new("ddr_cached", 0xC000_0000, 0x4000_0000),
];

/// Read-only view over one device table
#[derive(Debug, Clone, Copy)]
pub struct DeviceRegistry {
    devices: &'static [MappedDevice],
}

impl DeviceRegistry {
    pub const fn new(devices: &'static [MappedDevice]) -> Self {
        Self { devices }
    }

    /// First device whose name matches exactly
    pub fn find(&self, name: &str) -> Option<&'static MappedDevice> {
        self.devices.iter().find(|dev| dev.name == name)
    }

    /// All devices in table order
    pub fn list(&self) -> &'static [MappedDevice] {
        self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Log the table, one line per device
    pub fn log_devices(&self, domain: &str) {
        for dev in self.devices {
            log::info!("[{}] {}", domain, dev);
        }
    }
}
