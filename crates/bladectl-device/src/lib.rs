//! Backend selection and device handle
//!
//! This crate hides which backend talks to the device. The CLI parses a
//! specifier, hands it to a [`BackendSelector`] and only ever works with the
//! resulting [`DeviceHandle`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       CLI (bin/bladectl)                     │
//! │  - Only imports bladectl-device and bladectl-core            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  bladectl-device (this crate)                │
//! │  - BackendSelector: specifier -> first backend that opens    │
//! │  - DeviceHandle: load, tune, sample rate, flash, samples     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//! ┌──────────────────┐ ┌──────────────┐ ┌──────────────────┐
//! │  bladectl-usb    │ │ bladectl-    │ │  bladectl-dummy  │
//! │  nusb vendor     │ │ linux        │ │  simulated       │
//! │  requests        │ │ ioctl on     │ │  device          │
//! │                  │ │ /dev/bladerf │ │                  │
//! └──────────────────┘ └──────────────┘ └──────────────────┘
//! ```
//!
//! When the specifier names no backend, USB is tried first and the kernel
//! driver second. The simulated device is only opened when named.
//!
//! # Example
//!
//! ```ignore
//! use bladectl_core::Module;
//! use bladectl_device::BackendSelector;
//!
//! let mut dev = BackendSelector::new().open("*:serial=0123456789abcdef")?;
//! dev.load_bitstream(&std::fs::read("hostedx40.rbf")?)?;
//! dev.set_frequency(Module::Rx, 915_000_000)?;
//! dev.set_sample_rate(Module::Rx, 2_000_000)?;
//! ```

mod handle;
mod registry;

pub use handle::DeviceHandle;
pub use registry::{
    available_backends, backend_names_short, BackendEntry, BackendSelector, BoxedTransport,
    OpenFn, ProbeFn,
};
