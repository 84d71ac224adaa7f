//! Fifo ports - bounded lock-free queues for the five AXI4 channels
//!
//! A [`FifoPort`] is shared between exactly two parties: the bus manager
//! (the transaction engine) and the bus subordinate (the device side of the
//! bridge). Each party accesses the port through its own view, which only
//! allows the directions that party drives.
//!
//! # Lock-Free Guarantees
//! - Multi-producer/multi-consumer safe (backed by `crossbeam` `ArrayQueue`)
//! - Wait-free enqueue when space is available
//! - Wait-free dequeue when data is available

use crossbeam::queue::ArrayQueue;

use crate::{Channel, Flit, PortError, Result, Transport};

/// Five bounded queues forming one bridge port
pub struct FifoPort {
    queues: [ArrayQueue<Flit>; 5],
    capacity: usize,
}

impl FifoPort {
    /// Create a port whose channels each hold `capacity` flits
    ///
    /// # Errors
    /// Returns `PortError::InvalidCapacity` unless `capacity` is a non-zero
    /// power of 2
    pub fn new(capacity: usize) -> Result<Self> {
        if !capacity.is_power_of_two() {
            return Err(PortError::InvalidCapacity { capacity });
        }

        Ok(Self {
            queues: core::array::from_fn(|_| ArrayQueue::new(capacity)),
            capacity,
        })
    }

    /// Per-channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current occupancy of one channel
    pub fn len(&self, channel: Channel) -> usize {
        self.queues[channel.index()].len()
    }

    /// Check if a channel is empty
    pub fn is_empty(&self, channel: Channel) -> bool {
        self.queues[channel.index()].is_empty()
    }

    /// Check if a channel is full
    pub fn is_full(&self, channel: Channel) -> bool {
        self.queues[channel.index()].is_full()
    }

    /// Manager-side view (drives AW, W, AR; consumes B, R)
    pub fn manager(&self) -> Manager<'_> {
        Manager { port: self }
    }

    /// Subordinate-side view (consumes AW, W, AR; drives B, R)
    pub fn subordinate(&self) -> Subordinate<'_> {
        Subordinate { port: self }
    }

    fn push(&self, flit: Flit) -> core::result::Result<(), Flit> {
        self.queues[flit.channel().index()].push(flit)
    }

    fn pop(&self, channel: Channel) -> Option<Flit> {
        self.queues[channel.index()].pop()
    }
}

/// Manager handle for a fifo port
pub struct Manager<'a> {
    port: &'a FifoPort,
}

impl Transport for Manager<'_> {
    fn try_send(&self, flit: Flit) -> core::result::Result<(), Flit> {
        if !flit.channel().is_request() {
            return Err(flit);
        }
        self.port.push(flit)
    }

    fn try_receive(&self, channel: Channel) -> Option<Flit> {
        if channel.is_request() {
            return None;
        }
        self.port.pop(channel)
    }
}

/// Subordinate handle for a fifo port
pub struct Subordinate<'a> {
    port: &'a FifoPort,
}

impl Transport for Subordinate<'_> {
    fn try_send(&self, flit: Flit) -> core::result::Result<(), Flit> {
        if flit.channel().is_request() {
            return Err(flit);
        }
        self.port.push(flit)
    }

    fn try_receive(&self, channel: Channel) -> Option<Flit> {
        if !channel.is_request() {
            return None;
        }
        self.port.pop(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BFlit, Resp};

    fn b_flit() -> Flit {
        Flit::B(BFlit {
            id: vec![0],
            resp: Resp::Okay,
            user: vec![0],
        })
    }

    #[test]
    fn test_capacity_must_be_power_of_two() {
        assert!(FifoPort::new(16).is_ok());
        assert_eq!(
            FifoPort::new(12).err(),
            Some(PortError::InvalidCapacity { capacity: 12 })
        );
        assert!(FifoPort::new(0).is_err());
    }

    #[test]
    fn test_wrong_direction_is_rejected() {
        let port = FifoPort::new(4).unwrap();

        // The manager never drives B
        assert!(port.manager().try_send(b_flit()).is_err());
        assert!(port.is_empty(Channel::B));

        // The subordinate does
        assert!(port.subordinate().try_send(b_flit()).is_ok());
        assert!(port.subordinate().try_receive(Channel::B).is_none());
        assert_eq!(port.manager().try_receive(Channel::B), Some(b_flit()));
    }

    #[test]
    fn test_full_channel_hands_flit_back() {
        let port = FifoPort::new(2).unwrap();
        let sub = port.subordinate();

        assert!(sub.try_send(b_flit()).is_ok());
        assert!(sub.try_send(b_flit()).is_ok());
        assert!(port.is_full(Channel::B));

        let rejected = sub.try_send(b_flit());
        assert_eq!(rejected, Err(b_flit()));
        assert_eq!(port.len(Channel::B), 2);
    }
}
