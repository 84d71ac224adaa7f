//! Port Broker - discovery of bridge ports by path
//!
//! The subordinate side of a bridge establishes a port under a path (by
//! convention `<ports_dir>/<domain folder>`); the manager side opens it by
//! the same path. The broker tracks the state of every port so that a port
//! can be closed and later re-opened. Several handles may be open on one
//! port; it is closed when the last of them is.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{Channel, FifoPort, Flit, PortError, Result, Transport};

/// Port state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// Established by the subordinate, never opened
    Establishing,
    /// Opened by a manager
    Active,
    /// Every handle opened on it has been closed
    Closed,
}

struct PortEntry {
    port: Arc<FifoPort>,
    state: PortState,
    handles: usize,
}

/// Port Broker - manages named bridge ports
pub struct PortBroker {
    ports: Mutex<BTreeMap<PathBuf, PortEntry>>,
    next_handle: AtomicU64,
}

impl PortBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self {
            ports: Mutex::new(BTreeMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Establish a new port at `path`
    ///
    /// # Arguments
    /// * `path` - Port path, e.g. `<ports_dir>/h2f_lw`
    /// * `capacity` - Flits per channel (power of 2)
    ///
    /// # Errors
    /// `PortExists` if a port is already established at `path`, or
    /// `InvalidCapacity` for a bad capacity
    pub fn establish(&self, path: impl AsRef<Path>, capacity: usize) -> Result<Arc<FifoPort>> {
        let path = path.as_ref();
        let mut ports = self.lock();
        if ports.contains_key(path) {
            return Err(PortError::PortExists {
                path: path.display().to_string(),
            });
        }

        let port = Arc::new(FifoPort::new(capacity)?);
        ports.insert(
            path.to_path_buf(),
            PortEntry {
                port: Arc::clone(&port),
                state: PortState::Establishing,
                handles: 0,
            },
        );
        log::debug!("established port {} (capacity {})", path.display(), capacity);

        Ok(port)
    }

    /// Open the port at `path` as its manager
    ///
    /// # Errors
    /// `PortNotFound` if nothing was established at `path`
    pub fn open(&self, path: impl AsRef<Path>) -> Result<PortHandle> {
        let path = path.as_ref();
        let mut ports = self.lock();
        let entry = ports.get_mut(path).ok_or_else(|| PortError::PortNotFound {
            path: path.display().to_string(),
        })?;

        entry.state = PortState::Active;
        entry.handles += 1;
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        log::debug!(
            "opened port {} (handle {}, {} open)",
            path.display(),
            id,
            entry.handles
        );

        Ok(PortHandle {
            id,
            path: path.to_path_buf(),
            port: Arc::clone(&entry.port),
        })
    }

    /// Close a handle previously returned by [`PortBroker::open`]
    ///
    /// The port stays `Active` while other handles remain open on it.
    ///
    /// # Errors
    /// `PortNotFound` if the port was withdrawn in the meantime, or
    /// `PortClosed` if the handle belongs to a port since re-established at
    /// the same path
    pub fn close(&self, handle: PortHandle) -> Result<()> {
        let mut ports = self.lock();
        let entry = ports
            .get_mut(&handle.path)
            .ok_or_else(|| PortError::PortNotFound {
                path: handle.path.display().to_string(),
            })?;

        if !Arc::ptr_eq(&entry.port, &handle.port) || entry.handles == 0 {
            return Err(PortError::PortClosed {
                path: handle.path.display().to_string(),
            });
        }

        entry.handles -= 1;
        if entry.handles == 0 {
            entry.state = PortState::Closed;
        }
        log::debug!(
            "closed handle {} on {} ({} open)",
            handle.id,
            handle.path.display(),
            entry.handles
        );
        Ok(())
    }

    /// Remove the port at `path` entirely
    pub fn withdraw(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| PortError::PortNotFound {
                path: path.display().to_string(),
            })
    }

    /// Current state of the port at `path`
    pub fn state(&self, path: impl AsRef<Path>) -> Option<PortState> {
        self.lock().get(path.as_ref()).map(|entry| entry.state)
    }

    /// Paths of all established ports
    pub fn list(&self) -> Vec<PathBuf> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, PortEntry>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.ports.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for PortBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Manager handle to an opened port
pub struct PortHandle {
    id: u64,
    path: PathBuf,
    port: Arc<FifoPort>,
}

impl PortHandle {
    /// Handle identifier (unique per broker)
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Path the port was opened at
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Deref for PortHandle {
    type Target = FifoPort;

    fn deref(&self) -> &FifoPort {
        &self.port
    }
}

impl Transport for PortHandle {
    fn try_send(&self, flit: Flit) -> core::result::Result<(), Flit> {
        self.port.manager().try_send(flit)
    }

    fn try_receive(&self, channel: Channel) -> Option<Flit> {
        self.port.manager().try_receive(channel)
    }
}

impl core::fmt::Debug for PortHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PortHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}
