//! Lock-free single-producer/single-consumer packet ring.
//!
//! `head` is written only by the [`RingProducer`], `tail` only by the
//! [`RingConsumer`]. Both endpoints are move-only, so the single writer per
//! index holds by construction.
//!
//! # Memory Ordering
//!
//! - Producer writes the slot (and its frame) with plain stores, then
//!   publishes `head` with `Release`; it reads `tail` with `Acquire`.
//! - Consumer reads `head` with `Acquire` before touching the slot, then
//!   returns it by storing `tail` with `Release`.

mod descriptor;
mod region;

pub use descriptor::{timestamp_ns, DescFlags, PacketDescriptor};
pub use region::FrameRegion;

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Smallest ring accepted by [`PacketRing::new`].
pub const MIN_RING_CAPACITY: usize = 2;
/// Largest ring accepted by [`PacketRing::new`].
pub const MAX_RING_CAPACITY: usize = 1 << 16;
/// Smallest frame accepted by [`PacketRing::new`].
pub const MIN_FRAME_SIZE: usize = 64;
/// Largest frame accepted by [`PacketRing::new`] (jumbo frame).
pub const MAX_FRAME_SIZE: usize = 9216;

/// Full/empty signals returned by the frame-level ring operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    #[error("ring is full")]
    Full,
    #[error("ring is empty")]
    Empty,
    #[error("frame of {len} bytes exceeds slot size {max}")]
    FrameTooLarge { len: usize, max: usize },
}

/// Errors constructing a ring.
#[derive(Debug, Error)]
pub enum RingSetupError {
    #[error("ring capacity {0} must be a power of two in [{min}, {max}]", min = MIN_RING_CAPACITY, max = MAX_RING_CAPACITY)]
    InvalidCapacity(usize),
    #[error("frame size {0} must be in [{min}, {max}]", min = MIN_FRAME_SIZE, max = MAX_FRAME_SIZE)]
    InvalidFrameSize(usize),
    #[error("frame region allocation failed: {0}")]
    Alloc(#[from] std::io::Error),
}

/// Check ring geometry without allocating.
pub fn validate_geometry(capacity: usize, frame_size: usize) -> Result<(), RingSetupError> {
    if !capacity.is_power_of_two() || !(MIN_RING_CAPACITY..=MAX_RING_CAPACITY).contains(&capacity) {
        return Err(RingSetupError::InvalidCapacity(capacity));
    }
    if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&frame_size) {
        return Err(RingSetupError::InvalidFrameSize(frame_size));
    }
    Ok(())
}

/// Keeps `head` and `tail` on separate cache lines.
#[repr(align(64))]
struct PaddedIndex(AtomicUsize);

struct Slot(UnsafeCell<PacketDescriptor>);

/// Fixed-capacity ring of packet descriptors over a pinned frame region.
pub struct PacketRing {
    head: PaddedIndex,
    tail: PaddedIndex,
    mask: usize,
    slots: Box<[Slot]>,
    region: FrameRegion,
}

// SAFETY: slot contents are only accessed by the endpoint that currently
// owns the slot, as established by the acquire/release protocol on
// `head`/`tail`.
unsafe impl Sync for PacketRing {}
unsafe impl Send for PacketRing {}

impl PacketRing {
    pub fn new(capacity: usize, frame_size: usize) -> Result<Self, RingSetupError> {
        validate_geometry(capacity, frame_size)?;
        let region = FrameRegion::new(capacity, frame_size)?;
        let slots = (0..capacity)
            .map(|_| Slot(UnsafeCell::new(PacketDescriptor::default())))
            .collect();
        Ok(Self {
            head: PaddedIndex(AtomicUsize::new(0)),
            tail: PaddedIndex(AtomicUsize::new(0)),
            mask: capacity - 1,
            slots,
            region,
        })
    }

    /// Split into its producer and consumer endpoints.
    pub fn split(self) -> (RingProducer, RingConsumer) {
        let ring = Arc::new(self);
        let producer = RingProducer {
            ring: Arc::clone(&ring),
            head: 0,
            cached_tail: 0,
            next_sequence: 0,
        };
        let consumer = RingConsumer {
            ring,
            tail: 0,
            cached_head: 0,
        };
        (producer, consumer)
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    pub fn frame_size(&self) -> usize {
        self.region.frame_size()
    }

    /// Occupied slots as observed right now.
    pub fn len(&self) -> usize {
        let tail = self.tail.0.load(Ordering::Acquire);
        let head = self.head.0.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, index: usize) -> *mut PacketDescriptor {
        self.slots[index & self.mask].0.get()
    }
}

impl std::fmt::Debug for PacketRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketRing")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("region", &self.region)
            .finish()
    }
}

/// Producer endpoint: the only writer of `head`.
pub struct RingProducer {
    ring: Arc<PacketRing>,
    head: usize,
    cached_tail: usize,
    next_sequence: u64,
}

impl RingProducer {
    fn has_room(&mut self) -> bool {
        if self.head.wrapping_sub(self.cached_tail) < self.ring.capacity() {
            return true;
        }
        self.cached_tail = self.ring.tail.0.load(Ordering::Acquire);
        self.head.wrapping_sub(self.cached_tail) < self.ring.capacity()
    }

    fn publish(&mut self, desc: PacketDescriptor) {
        // SAFETY: has_room() confirmed the consumer released this slot, and
        // it is not visible to the consumer until `head` is stored below.
        unsafe { self.ring.slot(self.head).write(desc) };
        self.head = self.head.wrapping_add(1);
        self.ring.head.0.store(self.head, Ordering::Release);
    }

    /// Publish a descriptor. Returns false without blocking when full.
    ///
    /// The descriptor is stored as given; its payload is only readable via
    /// [`RxSlot::payload`] when it addresses the frame of the slot it lands in.
    pub fn try_enqueue(&mut self, desc: PacketDescriptor) -> bool {
        if !self.has_room() {
            return false;
        }
        self.publish(desc);
        true
    }

    /// Copy `payload` into the next slot's frame and publish it.
    pub fn try_enqueue_frame(
        &mut self,
        payload: &[u8],
        flags: DescFlags,
    ) -> Result<PacketDescriptor, RingError> {
        let max = self.ring.frame_size();
        if payload.len() > max {
            return Err(RingError::FrameTooLarge { len: payload.len(), max });
        }
        if !self.has_room() {
            return Err(RingError::Full);
        }
        let index = self.head & self.ring.mask;
        // SAFETY: we own slot `index` until publish(); length checked above.
        unsafe { self.ring.region.write_frame(index, payload) };
        let desc = PacketDescriptor::new(
            self.ring.region.offset_of(index) as u32,
            payload.len() as u32,
            self.next_sequence,
            flags,
        );
        self.next_sequence += 1;
        self.publish(desc);
        Ok(desc)
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn frame_size(&self) -> usize {
        self.ring.frame_size()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn is_full(&mut self) -> bool {
        !self.has_room()
    }
}

/// Consumer endpoint: the only writer of `tail`.
pub struct RingConsumer {
    ring: Arc<PacketRing>,
    tail: usize,
    cached_head: usize,
}

impl RingConsumer {
    fn has_data(&mut self) -> bool {
        if self.tail != self.cached_head {
            return true;
        }
        self.cached_head = self.ring.head.0.load(Ordering::Acquire);
        self.tail != self.cached_head
    }

    fn read_slot(&self) -> PacketDescriptor {
        // SAFETY: has_data() acquired `head`, so the producer's write of
        // this slot happens-before this read and it will not be rewritten
        // until `tail` moves past it.
        unsafe { self.ring.slot(self.tail).read() }
    }

    fn release(&mut self) {
        self.tail = self.tail.wrapping_add(1);
        self.ring.tail.0.store(self.tail, Ordering::Release);
    }

    /// Take the oldest descriptor. Returns None without blocking when empty.
    pub fn try_dequeue(&mut self) -> Option<PacketDescriptor> {
        if !self.has_data() {
            return None;
        }
        let desc = self.read_slot();
        self.release();
        Some(desc)
    }

    /// Borrow the oldest slot in place. The slot is released when the
    /// returned guard is dropped.
    pub fn peek(&mut self) -> Option<RxSlot<'_>> {
        if !self.has_data() {
            return None;
        }
        let desc = self.read_slot();
        Some(RxSlot { consumer: self, desc })
    }

    /// Copy the oldest frame into `out` and release its slot.
    pub fn try_dequeue_frame(&mut self, out: &mut Vec<u8>) -> Result<PacketDescriptor, RingError> {
        let slot = self.peek().ok_or(RingError::Empty)?;
        out.clear();
        out.extend_from_slice(slot.payload());
        Ok(slot.descriptor())
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

/// A ring slot borrowed by the consumer.
pub struct RxSlot<'a> {
    consumer: &'a mut RingConsumer,
    desc: PacketDescriptor,
}

impl RxSlot<'_> {
    pub fn descriptor(&self) -> PacketDescriptor {
        self.desc
    }

    /// The frame bytes described by this slot's descriptor.
    ///
    /// Empty when the descriptor does not address this slot's own frame.
    pub fn payload(&self) -> &[u8] {
        let ring = &self.consumer.ring;
        let index = self.consumer.tail & ring.mask;
        let len = self.desc.len as usize;
        if self.desc.offset as usize != ring.region.offset_of(index) || len > ring.frame_size() {
            return &[];
        }
        // SAFETY: the slot stays owned by the consumer while this guard
        // lives; offset and length were checked against the slot's frame.
        unsafe { ring.region.frame(index, len) }
    }
}

impl Drop for RxSlot<'_> {
    fn drop(&mut self) {
        self.consumer.release();
    }
}
