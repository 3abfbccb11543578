//! NIC device access.
//!
//! A [`DeviceSession`] owns one PCI function for its lifetime: it opens the
//! function through a [`DeviceDriver`], allocates the RX and TX rings and
//! tracks the link state that gates all packet I/O.

mod address;
mod driver;
mod error;
mod loopback;
mod session;
mod state;

pub use address::{PciAddress, PciAddressError, MAX_PCI_DEVICE, MAX_PCI_FUNCTION};
pub use driver::{DeviceDriver, QueueIds, RawStats};
pub use error::{DeviceError, DriverError};
pub use loopback::LoopbackDriver;
pub use session::{DeviceConfig, DeviceHandle, DeviceIo, DeviceSession, RxPort, TxPort};
pub use state::{LinkCell, LinkState};
