//! Pinned frame region backing a packet ring.
//!
//! One anonymous mapping holds `frames` fixed-size frames. Frame `i`
//! belongs to ring slot `i`, so ownership of a frame follows ownership of
//! its slot: the producer writes it before publishing the slot, the
//! consumer reads it after acquiring the slot.

use std::io;

use memmap2::MmapMut;

pub struct FrameRegion {
    // Keeps the mapping alive; all access goes through `base`.
    _map: MmapMut,
    base: *mut u8,
    frame_size: usize,
    frames: usize,
}

// SAFETY: the region is only touched through `write_frame`/`frame`, whose
// callers uphold the slot-ownership protocol of the owning ring (a frame is
// never written and read concurrently).
unsafe impl Send for FrameRegion {}
unsafe impl Sync for FrameRegion {}

impl FrameRegion {
    pub fn new(frames: usize, frame_size: usize) -> io::Result<Self> {
        let len = frames
            .checked_mul(frame_size)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "frame region too large"))?;
        let mut map = MmapMut::map_anon(len)?;
        let base = map.as_mut_ptr();
        Ok(Self {
            _map: map,
            base,
            frame_size,
            frames,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Total size of the region in bytes.
    pub fn len(&self) -> usize {
        self.frames * self.frame_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn offset_of(&self, index: usize) -> usize {
        index * self.frame_size
    }

    /// Copy `payload` into frame `index`.
    ///
    /// # Safety
    ///
    /// The caller must own the slot for `index` (producer side, slot not yet
    /// published) and `payload.len() <= frame_size`.
    pub(crate) unsafe fn write_frame(&self, index: usize, payload: &[u8]) {
        debug_assert!(index < self.frames);
        debug_assert!(payload.len() <= self.frame_size);
        let dst = self.base.add(self.offset_of(index));
        std::ptr::copy_nonoverlapping(payload.as_ptr(), dst, payload.len());
    }

    /// Borrow `len` bytes of frame `index`.
    ///
    /// # Safety
    ///
    /// The caller must own the slot for `index` (consumer side, slot acquired
    /// and not yet released) and `len <= frame_size`.
    pub(crate) unsafe fn frame(&self, index: usize, len: usize) -> &[u8] {
        debug_assert!(index < self.frames);
        debug_assert!(len <= self.frame_size);
        std::slice::from_raw_parts(self.base.add(self.offset_of(index)), len)
    }
}

impl std::fmt::Debug for FrameRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRegion")
            .field("frames", &self.frames)
            .field("frame_size", &self.frame_size)
            .finish()
    }
}
