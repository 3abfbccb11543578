//! PCI bus/device/function addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Address of one NIC function, written `DDDD:BB:DD.F` in hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PciAddress {
    pub domain: u16,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

pub const MAX_PCI_DEVICE: u8 = 0x1f;
pub const MAX_PCI_FUNCTION: u8 = 0x7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed PCI address {input:?}: {reason}")]
pub struct PciAddressError {
    pub input: String,
    pub reason: &'static str,
}

impl PciAddress {
    pub const fn new(domain: u16, bus: u8, device: u8, function: u8) -> Self {
        Self { domain, bus, device, function }
    }
}

impl Default for PciAddress {
    fn default() -> Self {
        Self::new(0, 0, 0, 0)
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

fn hex_field<T>(
    input: &str,
    field: &str,
    width: usize,
    parse: fn(&str, u32) -> Result<T, std::num::ParseIntError>,
    reason: &'static str,
) -> Result<T, PciAddressError> {
    let err = || PciAddressError { input: input.to_string(), reason };
    if field.len() != width || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(err());
    }
    parse(field, 16).map_err(|_| err())
}

impl FromStr for PciAddress {
    type Err = PciAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let err = |reason| PciAddressError { input: input.to_string(), reason };

        let (domain, rest) = input.split_once(':').ok_or_else(|| err("missing domain"))?;
        let (bus, rest) = rest.split_once(':').ok_or_else(|| err("missing bus"))?;
        let (device, function) = rest.split_once('.').ok_or_else(|| err("missing function"))?;

        let domain = hex_field(input, domain, 4, u16::from_str_radix, "bad domain")?;
        let bus = hex_field(input, bus, 2, u8::from_str_radix, "bad bus")?;
        let device = hex_field(input, device, 2, u8::from_str_radix, "bad device")?;
        let function = hex_field(input, function, 1, u8::from_str_radix, "bad function")?;

        if device > MAX_PCI_DEVICE {
            return Err(err("device out of range"));
        }
        if function > MAX_PCI_FUNCTION {
            return Err(err("function out of range"));
        }
        Ok(Self::new(domain, bus, device, function))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_address() {
        let addr: PciAddress = "0000:00:00.0".parse().unwrap();
        assert_eq!(addr, PciAddress::default());
    }

    #[test]
    fn display_round_trips() {
        let addr = PciAddress::new(0x0001, 0x3b, 0x1f, 7);
        assert_eq!(addr.to_string(), "0001:3b:1f.7");
        assert_eq!(addr.to_string().parse::<PciAddress>().unwrap(), addr);
    }

    #[test]
    fn accepts_uppercase_hex() {
        let addr: PciAddress = "0000:AF:00.1".parse().unwrap();
        assert_eq!(addr.bus, 0xaf);
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "eth0", "0000:00:00", "0000:00.0", "000:00:00.0", "0000:00:20.0", "0000:00:00.8", "0000:0g:00.0", "0000:+1:00.0"] {
            assert!(bad.parse::<PciAddress>().is_err(), "{bad} should not parse");
        }
    }
}
