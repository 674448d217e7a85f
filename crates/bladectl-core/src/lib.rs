//! bladectl-core - Control-plane core for bladeRF-class USB SDRs
//!
//! This crate holds everything about the device that does not depend on how
//! the host talks to it: device identities and specifier parsing, the
//! 16-byte peripheral access frame, the [`Transport`](transport::Transport)
//! trait implemented by every backend, the FPGA bitstream loader, LMS6002D
//! PLL tuning and Si5338 sample-rate synthesis. It is `no_std` compatible;
//! the `std` feature only adds `std::error::Error` and a sleeping clock.
//!
//! # Features
//!
//! - `std` - Enable standard library support
//!
//! # Example
//!
//! ```ignore
//! use bladectl_core::{lms, transport::{Module, Transport}};
//!
//! fn tune<T: Transport + ?Sized>(dev: &mut T) -> bladectl_core::Result<()> {
//!     lms::set_frequency(dev, Module::Rx, 915_000_000)?;
//!     println!("RX at {} Hz", lms::get_frequency(dev, Module::Rx)?);
//!     Ok(())
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod bitstream;
pub mod error;
pub mod flash;
pub mod identity;
pub mod init;
pub mod lms;
pub mod otp;
pub mod protocol;
pub mod sample;
pub mod si5338;
pub mod transport;

#[cfg(test)]
mod mock;

pub use error::{Error, ParseFailure, Result};
pub use identity::{BackendKind, DeviceIdentity};
pub use transport::{Module, Transport};
