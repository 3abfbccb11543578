//! Device session lifecycle and per-direction I/O ports.

use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use super::address::PciAddress;
use super::driver::{DeviceDriver, QueueIds, RawStats};
use super::error::{DeviceError, DriverError};
use super::state::{LinkCell, LinkState};
use crate::dispatch::{DrainReport, InferenceDispatcher};
use crate::ring::{self, DescFlags, PacketRing, RingConsumer, RingError, RingProducer, RxSlot};
use crate::stats::{Stats, StatsCounter};

/// Ring geometry for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Slots per ring; must be a power of two.
    pub ring_capacity: usize,
    /// Bytes per frame.
    pub frame_size: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 256,
            frame_size: 2048,
        }
    }
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<(), DeviceError> {
        ring::validate_geometry(self.ring_capacity, self.frame_size)
            .map_err(|e| DeviceError::ConfigInvalid(e.to_string()))
    }
}

/// Identity of an open function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle {
    address: PciAddress,
    queues: QueueIds,
    session_id: Uuid,
}

impl DeviceHandle {
    pub fn address(&self) -> PciAddress {
        self.address
    }

    pub fn queues(&self) -> QueueIds {
        self.queues
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

fn check_up(link: &LinkCell) -> Result<(), DeviceError> {
    match link.load() {
        LinkState::Up => Ok(()),
        LinkState::Closed => Err(DeviceError::SessionClosed),
        other => Err(DeviceError::SessionNotReady(other)),
    }
}

/// An open NIC function with its RX and TX rings.
pub struct DeviceSession {
    handle: DeviceHandle,
    config: DeviceConfig,
    driver: Arc<dyn DeviceDriver>,
    link: Arc<LinkCell>,
    counters: Arc<StatsCounter>,
    io: Mutex<Option<DeviceIo>>,
    dispatcher: Mutex<Option<Arc<InferenceDispatcher>>>,
    close_lock: tokio::sync::Mutex<()>,
}

impl DeviceSession {
    /// Open `device_id` through `driver` and allocate its rings.
    pub fn open(
        device_id: &str,
        config: DeviceConfig,
        driver: Arc<dyn DeviceDriver>,
    ) -> Result<Self, DeviceError> {
        config.validate()?;
        let address: PciAddress = device_id
            .parse()
            .map_err(|e: super::PciAddressError| DeviceError::ConfigInvalid(e.to_string()))?;

        let link = Arc::new(LinkCell::new(LinkState::Down));
        link.store(LinkState::Initializing);
        tracing::info!(device = %address, driver = driver.name(), "opening device");

        let queues = driver.open(address).map_err(|e| match e {
            DriverError::UnknownFunction(id) => DeviceError::NotFound(id),
            other => DeviceError::Driver(other),
        })?;

        let rings = PacketRing::new(config.ring_capacity, config.frame_size)
            .and_then(|rx| Ok((rx, PacketRing::new(config.ring_capacity, config.frame_size)?)));
        let (rx_ring, tx_ring) = match rings {
            Ok(rings) => rings,
            Err(e) => {
                if let Err(close_err) = driver.close(address) {
                    tracing::warn!(device = %address, error = %close_err, "close after failed open");
                }
                return Err(DeviceError::Alloc(e.to_string()));
            }
        };

        let counters = Arc::new(StatsCounter::new());
        let oversized_seen = driver.raw_stats(address).map_or(0, |s| s.rx_oversized);
        let (rx_producer, rx_consumer) = rx_ring.split();
        let (tx_producer, tx_consumer) = tx_ring.split();
        let io = DeviceIo {
            rx: RxPort {
                address,
                driver: Arc::clone(&driver),
                link: Arc::clone(&link),
                counters: Arc::clone(&counters),
                device_side: rx_producer,
                ring: rx_consumer,
                oversized_seen,
            },
            tx: TxPort {
                address,
                driver: Arc::clone(&driver),
                link: Arc::clone(&link),
                counters: Arc::clone(&counters),
                ring: tx_producer,
                device_side: tx_consumer,
            },
        };

        let handle = DeviceHandle {
            address,
            queues,
            session_id: Uuid::new_v4(),
        };
        link.store(LinkState::Up);
        tracing::info!(
            device = %address,
            session = %handle.session_id,
            rx_queue = queues.rx,
            tx_queue = queues.tx,
            ring_capacity = config.ring_capacity,
            frame_size = config.frame_size,
            "device up"
        );

        Ok(Self {
            handle,
            config,
            driver,
            link,
            counters,
            io: Mutex::new(Some(io)),
            dispatcher: Mutex::new(None),
            close_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn state(&self) -> LinkState {
        self.link.load()
    }

    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Shared counters bumped by the ports and the dispatcher.
    pub fn counters(&self) -> Arc<StatsCounter> {
        Arc::clone(&self.counters)
    }

    /// Counter snapshot. Valid while the link is up or closing.
    pub fn stats(&self) -> Result<Stats, DeviceError> {
        match self.link.load() {
            LinkState::Up | LinkState::Closing => Ok(self.counters.snapshot()),
            LinkState::Closed => Err(DeviceError::SessionClosed),
            other => Err(DeviceError::SessionNotReady(other)),
        }
    }

    pub fn raw_stats(&self) -> Result<RawStats, DeviceError> {
        check_up(&self.link)?;
        Ok(self.driver.raw_stats(self.handle.address)?)
    }

    /// Hand out the RX and TX ports. Only the first call succeeds.
    pub fn take_io(&self) -> Result<DeviceIo, DeviceError> {
        check_up(&self.link)?;
        self.io
            .lock()
            .take()
            .ok_or(DeviceError::PortsTaken)
    }

    /// Register the dispatcher drained by [`close`](Self::close).
    pub fn attach_dispatcher(&self, dispatcher: Arc<InferenceDispatcher>) -> Result<(), DeviceError> {
        check_up(&self.link)?;
        *self.dispatcher.lock() = Some(dispatcher);
        Ok(())
    }

    /// Close the session. Every in-flight request of the attached
    /// dispatcher is resolved before this returns. Idempotent.
    pub async fn close(&self) -> DrainReport {
        let _guard = self.close_lock.lock().await;
        if !self.link.transition(LinkState::Up, LinkState::Closing) {
            return DrainReport { resolved: 0 };
        }
        let address = self.handle.address;
        tracing::info!(device = %address, "closing device");

        let dispatcher = self.dispatcher.lock().take();
        let report = match dispatcher {
            Some(dispatcher) => dispatcher.shutdown().await,
            None => DrainReport { resolved: 0 },
        };

        if let Err(e) = self.driver.close(address) {
            tracing::warn!(device = %address, error = %e, "driver close failed");
        }
        self.io.lock().take();
        self.link.store(LinkState::Closed);
        tracing::info!(device = %address, drained = report.resolved, "device closed");
        report
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.link.transition(LinkState::Up, LinkState::Closed) {
            if let Err(e) = self.driver.close(self.handle.address) {
                tracing::warn!(device = %self.handle.address, error = %e, "driver close on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("handle", &self.handle)
            .field("state", &self.state())
            .finish()
    }
}

/// The two I/O directions of a session.
pub struct DeviceIo {
    pub rx: RxPort,
    pub tx: TxPort,
}

/// Receive side: the driver fills the ring, the owner drains it.
pub struct RxPort {
    address: PciAddress,
    driver: Arc<dyn DeviceDriver>,
    link: Arc<LinkCell>,
    counters: Arc<StatsCounter>,
    device_side: RingProducer,
    ring: RingConsumer,
    /// Driver's `rx_oversized` count already folded into `packets_dropped`.
    oversized_seen: u64,
}

impl RxPort {
    /// Let the driver deliver up to one ring's worth of frames.
    pub fn poll(&mut self) -> Result<usize, DeviceError> {
        check_up(&self.link)?;
        let budget = self.device_side.capacity();
        let received = self
            .driver
            .poll_rx(self.address, &mut self.device_side, budget)?;
        if received > 0 {
            self.counters.add_received(received as u64);
        }
        let oversized = self.driver.raw_stats(self.address)?.rx_oversized;
        for _ in self.oversized_seen..oversized {
            self.counters.add_dropped("rx_oversized");
        }
        self.oversized_seen = self.oversized_seen.max(oversized);
        Ok(received)
    }

    /// Borrow the oldest received frame without copying it.
    pub fn next(&mut self) -> Result<Option<RxSlot<'_>>, DeviceError> {
        check_up(&self.link)?;
        Ok(self.ring.peek())
    }

    /// Frames waiting in the ring.
    pub fn pending(&self) -> usize {
        self.ring.len()
    }
}

/// Transmit side: the owner fills the ring, the driver drains it.
pub struct TxPort {
    address: PciAddress,
    driver: Arc<dyn DeviceDriver>,
    link: Arc<LinkCell>,
    counters: Arc<StatsCounter>,
    ring: RingProducer,
    device_side: RingConsumer,
}

impl TxPort {
    /// Queue a frame. `Ok(false)` means the ring is full.
    pub fn try_send(&mut self, payload: &[u8], flags: DescFlags) -> Result<bool, DeviceError> {
        check_up(&self.link)?;
        match self.ring.try_enqueue_frame(payload, flags) {
            Ok(_) => Ok(true),
            Err(RingError::Full) => Ok(false),
            Err(RingError::FrameTooLarge { len, max }) => Err(DeviceError::FrameTooLarge { len, max }),
            Err(RingError::Empty) => Ok(false),
        }
    }

    /// Let the driver transmit queued frames.
    pub fn flush(&mut self) -> Result<usize, DeviceError> {
        check_up(&self.link)?;
        let budget = self.device_side.capacity();
        let sent = self
            .driver
            .poll_tx(self.address, &mut self.device_side, budget)?;
        if sent > 0 {
            self.counters.add_sent(sent as u64);
        }
        Ok(sent)
    }

    /// Frames queued but not yet transmitted.
    pub fn backlog(&self) -> usize {
        self.ring.len()
    }

    pub fn frame_size(&self) -> usize {
        self.ring.frame_size()
    }
}
