//! Packet descriptors stored in ring slots.

use std::time::{SystemTime, UNIX_EPOCH};

bitflags::bitflags! {
    /// Per-packet flag bits carried in a descriptor.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct DescFlags: u16 {
        /// Payload carries an inference request frame.
        const NEEDS_INFERENCE = 1 << 0;
        /// Payload carries an inference response frame.
        const RESPONSE = 1 << 1;
        /// Device flagged the packet as errored (bad checksum, truncated DMA).
        const ERROR = 1 << 2;
    }
}

/// Describes one packet held in a ring slot.
///
/// The frame it references belongs to the ring's pinned region; a
/// descriptor is never allocated or freed on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketDescriptor {
    /// Byte offset of the frame inside the ring's region.
    pub offset: u32,
    /// Payload length in bytes.
    pub len: u32,
    pub sequence: u64,
    /// Wall-clock nanoseconds at which the descriptor was produced.
    pub timestamp_ns: u64,
    pub flags: DescFlags,
}

impl PacketDescriptor {
    pub fn new(offset: u32, len: u32, sequence: u64, flags: DescFlags) -> Self {
        Self {
            offset,
            len,
            sequence,
            timestamp_ns: timestamp_ns(),
            flags,
        }
    }

    pub fn needs_inference(&self) -> bool {
        self.flags.contains(DescFlags::NEEDS_INFERENCE)
    }

    pub fn is_errored(&self) -> bool {
        self.flags.contains(DescFlags::ERROR)
    }
}

/// Nanoseconds since the Unix epoch, saturating at zero if the clock is
/// set before it.
pub fn timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
