//! Link state machine shared between a session and its ports.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Link state of a device function.
///
/// `Down -> Initializing -> Up -> Closing -> Closed`. Packet I/O is only
/// permitted while `Up`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LinkState {
    Down = 0,
    Initializing = 1,
    Up = 2,
    Closing = 3,
    Closed = 4,
}

impl LinkState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Initializing,
            2 => Self::Up,
            3 => Self::Closing,
            4 => Self::Closed,
            _ => Self::Down,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Down => "down",
            Self::Initializing => "initializing",
            Self::Up => "up",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic cell holding a [`LinkState`].
#[derive(Debug)]
pub struct LinkCell(AtomicU8);

impl LinkCell {
    pub fn new(state: LinkState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: LinkState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to`; returns false if the state was not `from`.
    pub fn transition(&self, from: LinkState, to: LinkState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
