//! In-memory driver: frames are injected by the caller on the receive side
//! and captured on the transmit side.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use super::address::PciAddress;
use super::driver::{DeviceDriver, QueueIds, RawStats};
use super::error::DriverError;
use crate::ring::{DescFlags, RingConsumer, RingError, RingProducer};

#[derive(Debug, Default)]
struct Function {
    open: bool,
    queues: QueueIds,
    rx_pending: VecDeque<(Vec<u8>, DescFlags)>,
    transmitted: Vec<Vec<u8>>,
    stats: RawStats,
}

#[derive(Debug)]
pub struct LoopbackDriver {
    functions: Mutex<HashMap<PciAddress, Function>>,
    /// Frames accepted per `poll_tx`; `None` means unlimited.
    tx_budget: Option<usize>,
}

impl LoopbackDriver {
    /// Driver exposing the given functions.
    pub fn new(addresses: impl IntoIterator<Item = PciAddress>) -> Self {
        let functions = addresses
            .into_iter()
            .enumerate()
            .map(|(i, addr)| {
                let queue = i as u16;
                let function = Function {
                    queues: QueueIds { rx: queue, tx: queue },
                    ..Function::default()
                };
                (addr, function)
            })
            .collect();
        Self {
            functions: Mutex::new(functions),
            tx_budget: None,
        }
    }

    /// Limit how many frames each `poll_tx` takes, to simulate a slow link.
    pub fn with_tx_budget(mut self, frames: usize) -> Self {
        self.tx_budget = Some(frames);
        self
    }

    /// Queue a frame as if it had arrived on the wire.
    pub fn inject(
        &self,
        addr: PciAddress,
        payload: impl Into<Vec<u8>>,
        flags: DescFlags,
    ) -> Result<(), DriverError> {
        let mut functions = self.functions.lock();
        let function = functions
            .get_mut(&addr)
            .ok_or_else(|| DriverError::UnknownFunction(addr.to_string()))?;
        function.rx_pending.push_back((payload.into(), flags));
        Ok(())
    }

    /// Frames transmitted since the last call.
    pub fn take_transmitted(&self, addr: PciAddress) -> Vec<Vec<u8>> {
        self.functions
            .lock()
            .get_mut(&addr)
            .map(|f| std::mem::take(&mut f.transmitted))
            .unwrap_or_default()
    }

    /// Injected frames not yet moved into the RX ring.
    pub fn pending_rx(&self, addr: PciAddress) -> usize {
        self.functions
            .lock()
            .get(&addr)
            .map_or(0, |f| f.rx_pending.len())
    }

    pub fn is_open(&self, addr: PciAddress) -> bool {
        self.functions.lock().get(&addr).is_some_and(|f| f.open)
    }
}

impl Default for LoopbackDriver {
    fn default() -> Self {
        Self::new([PciAddress::default()])
    }
}

fn open_function(
    functions: &mut HashMap<PciAddress, Function>,
    addr: PciAddress,
) -> Result<&mut Function, DriverError> {
    match functions.get_mut(&addr) {
        Some(f) if f.open => Ok(f),
        Some(_) => Err(DriverError::NotOpen(addr.to_string())),
        None => Err(DriverError::UnknownFunction(addr.to_string())),
    }
}

impl DeviceDriver for LoopbackDriver {
    fn name(&self) -> &str {
        "loopback"
    }

    fn open(&self, addr: PciAddress) -> Result<QueueIds, DriverError> {
        let mut functions = self.functions.lock();
        let function = functions
            .get_mut(&addr)
            .ok_or_else(|| DriverError::UnknownFunction(addr.to_string()))?;
        if function.open {
            return Err(DriverError::Busy(addr.to_string()));
        }
        function.open = true;
        Ok(function.queues)
    }

    fn close(&self, addr: PciAddress) -> Result<(), DriverError> {
        let mut functions = self.functions.lock();
        let function = open_function(&mut functions, addr)?;
        function.open = false;
        Ok(())
    }

    fn poll_rx(
        &self,
        addr: PciAddress,
        rx: &mut RingProducer,
        budget: usize,
    ) -> Result<usize, DriverError> {
        let mut functions = self.functions.lock();
        let function = open_function(&mut functions, addr)?;

        let mut moved = 0;
        while moved < budget {
            let Some((payload, flags)) = function.rx_pending.pop_front() else {
                break;
            };
            match rx.try_enqueue_frame(&payload, flags) {
                Ok(_) => {
                    moved += 1;
                    function.stats.rx_frames += 1;
                }
                Err(RingError::Full) => {
                    function.rx_pending.push_front((payload, flags));
                    function.stats.rx_ring_full += 1;
                    break;
                }
                Err(RingError::FrameTooLarge { .. }) | Err(RingError::Empty) => {
                    function.stats.rx_oversized += 1;
                }
            }
        }
        Ok(moved)
    }

    fn poll_tx(
        &self,
        addr: PciAddress,
        tx: &mut RingConsumer,
        budget: usize,
    ) -> Result<usize, DriverError> {
        let mut functions = self.functions.lock();
        let function = open_function(&mut functions, addr)?;
        let budget = self.tx_budget.map_or(budget, |limit| limit.min(budget));

        let mut sent = 0;
        while sent < budget {
            let Some(slot) = tx.peek() else {
                break;
            };
            function.transmitted.push(slot.payload().to_vec());
            drop(slot);
            sent += 1;
        }
        function.stats.tx_frames += sent as u64;
        Ok(sent)
    }

    fn raw_stats(&self, addr: PciAddress) -> Result<RawStats, DriverError> {
        self.functions
            .lock()
            .get(&addr)
            .map(|f| f.stats)
            .ok_or_else(|| DriverError::UnknownFunction(addr.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::PacketRing;

    #[test]
    fn open_rejects_unknown_and_busy() {
        let driver = LoopbackDriver::default();
        let other = PciAddress::new(0, 1, 0, 0);
        assert_eq!(
            driver.open(other),
            Err(DriverError::UnknownFunction(other.to_string()))
        );
        driver.open(PciAddress::default()).unwrap();
        assert!(matches!(
            driver.open(PciAddress::default()),
            Err(DriverError::Busy(_))
        ));
    }

    #[test]
    fn rx_stops_at_full_ring_without_losing_frames() {
        let addr = PciAddress::default();
        let driver = LoopbackDriver::default();
        driver.open(addr).unwrap();
        for i in 0..5u8 {
            driver.inject(addr, vec![i], DescFlags::empty()).unwrap();
        }

        let (mut producer, mut consumer) = PacketRing::new(4, 64).unwrap().split();
        assert_eq!(driver.poll_rx(addr, &mut producer, 16).unwrap(), 4);
        assert_eq!(driver.pending_rx(addr), 1);

        let mut buf = Vec::new();
        consumer.try_dequeue_frame(&mut buf).unwrap();
        assert_eq!(buf, vec![0]);
        assert_eq!(driver.poll_rx(addr, &mut producer, 16).unwrap(), 1);
        assert_eq!(driver.raw_stats(addr).unwrap().rx_ring_full, 1);
    }

    #[test]
    fn tx_budget_limits_each_poll() {
        let addr = PciAddress::default();
        let driver = LoopbackDriver::default().with_tx_budget(2);
        driver.open(addr).unwrap();

        let (mut producer, mut consumer) = PacketRing::new(8, 64).unwrap().split();
        for i in 0..3u8 {
            producer.try_enqueue_frame(&[i], DescFlags::RESPONSE).unwrap();
        }
        assert_eq!(driver.poll_tx(addr, &mut consumer, 8).unwrap(), 2);
        assert_eq!(driver.poll_tx(addr, &mut consumer, 8).unwrap(), 1);
        assert_eq!(driver.take_transmitted(addr), vec![vec![0], vec![1], vec![2]]);
    }
}
