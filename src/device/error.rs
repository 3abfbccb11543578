use thiserror::Error;

use super::state::LinkState;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device not found: {0}")]
    NotFound(String),

    #[error("invalid device configuration: {0}")]
    ConfigInvalid(String),

    #[error("device session is closed")]
    SessionClosed,

    #[error("device session not ready (link {0})")]
    SessionNotReady(LinkState),

    #[error("frame of {len} bytes exceeds frame size {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("I/O ports already taken")]
    PortsTaken,

    #[error("ring allocation failed: {0}")]
    Alloc(String),

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

/// Failure reported by a [`DeviceDriver`](super::DeviceDriver).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("no such function: {0}")]
    UnknownFunction(String),

    #[error("function {0} already open")]
    Busy(String),

    #[error("function {0} not open")]
    NotOpen(String),

    #[error("driver I/O failure: {0}")]
    Io(String),
}
