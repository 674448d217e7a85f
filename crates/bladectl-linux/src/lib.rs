//! bladectl-linux - kernel-driver transport for bladeRF-class SDRs
//!
//! This crate drives a bladeRF through the out-of-tree bladeRF kernel
//! driver, which exposes each device as a `/dev/bladerfN` character device.
//!
//! # Overview
//!
//! Register access, FPGA programming control, firmware upgrades and RF
//! path switching are ioctl control codes carrying small fixed structures.
//! FPGA images and samples are plain `write`/`read` calls on the device
//! node. The driver grants one open file per device, which keeps two
//! handles from talking to the same hardware.
//!
//! # Example
//!
//! ```no_run
//! use bladectl_core::{DeviceIdentity, Transport};
//! use bladectl_linux::KernelTransport;
//!
//! let identity = DeviceIdentity::parse("linux:instance=0")?;
//! let mut dev = KernelTransport::open(&identity)?;
//! println!("Firmware {}", dev.firmware_version()?);
//! println!("LMS 0x04 = 0x{:02x}", dev.lms_read(0x04)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with bladectl CLI
//!
//! ```bash
//! # List devices bound to the driver
//! bladectl probe
//!
//! # Load an FPGA image through the kernel driver
//! bladectl load -d linux:instance=0 hostedx40.rbf
//! ```
//!
//! # System Requirements
//!
//! - The bladeRF kernel module loaded and bound to the device
//! - Read/write access to `/dev/bladerfN`, usually through a udev rule

#[cfg(all(feature = "std", target_os = "linux"))]
mod device;
#[cfg(all(feature = "std", target_os = "linux"))]
mod error;
#[cfg(all(feature = "std", target_os = "linux"))]
mod protocol;

#[cfg(all(feature = "std", target_os = "linux"))]
pub use device::{device_nodes, probe, KernelTransport};
#[cfg(all(feature = "std", target_os = "linux"))]
pub use error::{KernelError, Result};
