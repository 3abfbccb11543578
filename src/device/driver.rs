//! Boundary to the NIC hardware.
//!
//! A driver moves frames between the device and the session's rings. Ring
//! endpoints are lent to the driver for the duration of one poll, so the
//! driver never holds on to ring memory.

use serde::{Deserialize, Serialize};

use super::address::PciAddress;
use super::error::DriverError;
use crate::ring::{RingConsumer, RingProducer};

/// Hardware queue pair assigned to an open function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueIds {
    pub rx: u16,
    pub tx: u16,
}

/// Counters kept by the driver itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStats {
    pub rx_frames: u64,
    pub tx_frames: u64,
    /// Frames the device delivered that did not fit a ring frame.
    pub rx_oversized: u64,
    /// Polls that stopped early because the RX ring was full.
    pub rx_ring_full: u64,
}

pub trait DeviceDriver: Send + Sync {
    fn name(&self) -> &str;

    /// Claim `addr` and return its queue pair.
    fn open(&self, addr: PciAddress) -> Result<QueueIds, DriverError>;

    fn close(&self, addr: PciAddress) -> Result<(), DriverError>;

    /// Move up to `budget` received frames into `rx`. Returns the number
    /// moved. Must not block.
    fn poll_rx(
        &self,
        addr: PciAddress,
        rx: &mut RingProducer,
        budget: usize,
    ) -> Result<usize, DriverError>;

    /// Transmit up to `budget` frames from `tx`. Returns the number sent.
    /// Must not block.
    fn poll_tx(
        &self,
        addr: PciAddress,
        tx: &mut RingConsumer,
        budget: usize,
    ) -> Result<usize, DriverError>;

    fn raw_stats(&self, addr: PciAddress) -> Result<RawStats, DriverError>;
}

