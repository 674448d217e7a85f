//! bladectl-usb - generic USB transport for bladeRF-class SDRs
//!
//! This crate talks to the FX3 USB controller through `nusb` without any
//! kernel driver. Supported devices:
//! - bladeRF (1d50:6066) running device firmware
//!
//! Devices sitting in the FX3 ROM bootloader (04b4:00f3) or the flash
//! bootloader (1d50:6080) are reported while probing but cannot be opened.
//!
//! # Protocol Overview
//!
//! Firmware requests are vendor control transfers on interface 0. The
//! interface's alternate setting decides what the bulk endpoints carry:
//! - RF link: 16-byte peripheral frames on EP 2, samples on EP 1
//! - SPI flash: page transfers over control requests
//! - Config: the raw FPGA bitstream on EP 2
//!
//! # Example
//!
//! ```no_run
//! use bladectl_core::{DeviceIdentity, Transport};
//! use bladectl_usb::UsbTransport;
//!
//! let identity = DeviceIdentity::parse("usb:instance=0")?;
//! let mut dev = UsbTransport::open(&identity)?;
//! println!("Firmware {}", dev.firmware_version()?);
//! println!("GPIO 0x{:08x}", dev.gpio_read()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Matching
//!
//! Identity fields map onto USB attributes as follows:
//!
//! - `instance=N`: the Nth bladeRF in enumeration order (0-indexed)
//! - `device=BUS:ADDR`: bus number and device address
//! - `serial=HEX`: the serial string descriptor

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
mod device;
#[cfg(feature = "std")]
mod error;
pub mod protocol;

#[cfg(feature = "std")]
pub use device::{probe, UsbTransport};
#[cfg(feature = "std")]
pub use error::{Result, UsbError};
