//! Backend registry and selection
//!
//! This module turns a device specifier into an open [`DeviceHandle`]. Each
//! compiled-in backend contributes one [`BackendEntry`] with plain function
//! pointers for opening and probing, so the selection logic never names a
//! concrete transport type.

use bladectl_core::error::{Error, Result};
use bladectl_core::{BackendKind, DeviceIdentity, Transport};

use crate::handle::DeviceHandle;

/// An open transport with its concrete type erased
pub type BoxedTransport = Box<dyn Transport + Send>;

/// Open the first device of a backend matching an identity
pub type OpenFn = fn(&DeviceIdentity) -> Result<BoxedTransport>;

/// List the identities of a backend's attached devices
pub type ProbeFn = fn() -> Result<Vec<DeviceIdentity>>;

/// One backend known to the selector
#[derive(Debug, Clone, Copy)]
pub struct BackendEntry {
    /// Which identities this backend answers
    pub kind: BackendKind,
    /// Primary name
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
    /// Open function
    pub open: OpenFn,
    /// Probe function
    pub probe: ProbeFn,
}

/// Get information about all available backends (enabled at compile time),
/// in the order `Any` tries them
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendEntry> {
    let mut backends = Vec::new();

    #[cfg(feature = "usb")]
    backends.push(BackendEntry {
        kind: BackendKind::UsbGeneric,
        name: "usb",
        description: "Generic USB access through nusb (VID:1d50 PID:6066)",
        open: open_usb,
        probe: probe_usb,
    });

    #[cfg(all(feature = "linux", target_os = "linux"))]
    backends.push(BackendEntry {
        kind: BackendKind::KernelDriver,
        name: "linux",
        description: "bladeRF kernel driver (/dev/bladerfN)",
        open: open_linux,
        probe: probe_linux,
    });

    #[cfg(feature = "dummy")]
    backends.push(BackendEntry {
        kind: BackendKind::Dummy,
        name: "dummy",
        description: "Simulated device for testing (only when named explicitly)",
        open: open_dummy,
        probe: probe_dummy,
    });

    backends
}

/// Generate a short list of backend names for CLI help
pub fn backend_names_short() -> String {
    let backends = available_backends();
    if backends.is_empty() {
        return "none (recompile with features)".to_string();
    }
    let names: Vec<&str> = backends.iter().map(|b| b.name).collect();
    names.join(", ")
}

#[cfg(feature = "usb")]
fn open_usb(identity: &DeviceIdentity) -> Result<BoxedTransport> {
    let transport = bladectl_usb::UsbTransport::open(identity)?;
    Ok(Box::new(transport))
}

#[cfg(feature = "usb")]
fn probe_usb() -> Result<Vec<DeviceIdentity>> {
    Ok(bladectl_usb::probe()?)
}

#[cfg(all(feature = "linux", target_os = "linux"))]
fn open_linux(identity: &DeviceIdentity) -> Result<BoxedTransport> {
    let transport = bladectl_linux::KernelTransport::open(identity)?;
    Ok(Box::new(transport))
}

#[cfg(all(feature = "linux", target_os = "linux"))]
fn probe_linux() -> Result<Vec<DeviceIdentity>> {
    Ok(bladectl_linux::probe()?)
}

#[cfg(feature = "dummy")]
fn open_dummy(identity: &DeviceIdentity) -> Result<BoxedTransport> {
    Ok(Box::new(bladectl_dummy::DummyDevice::open(identity)?))
}

#[cfg(feature = "dummy")]
fn probe_dummy() -> Result<Vec<DeviceIdentity>> {
    Ok(bladectl_dummy::probe())
}

/// Chooses and opens a backend for a device identity
pub struct BackendSelector {
    backends: Vec<BackendEntry>,
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendSelector {
    /// Selector over every compiled-in backend
    pub fn new() -> Self {
        Self::with_backends(available_backends())
    }

    /// Selector over an explicit backend table, tried in the given order
    pub fn with_backends(backends: Vec<BackendEntry>) -> Self {
        Self { backends }
    }

    /// Backends in precedence order
    pub fn backends(&self) -> &[BackendEntry] {
        &self.backends
    }

    /// Backends an identity may be opened with, in precedence order.
    ///
    /// `Any` covers every real backend; the simulated device must be named.
    fn candidates(&self, kind: BackendKind) -> impl Iterator<Item = &BackendEntry> {
        self.backends.iter().filter(move |entry| match kind {
            BackendKind::Any => entry.kind != BackendKind::Dummy,
            specific => entry.kind == specific,
        })
    }

    /// Parse a specifier and open the device it names
    pub fn open(&self, specifier: &str) -> Result<DeviceHandle> {
        let identity = DeviceIdentity::parse(specifier)?;
        self.open_identity(&identity)
    }

    /// Open a device by identity
    pub fn open_identity(&self, identity: &DeviceIdentity) -> Result<DeviceHandle> {
        self.open_transport(identity).map(DeviceHandle::new)
    }

    /// Open the raw transport for an identity.
    ///
    /// A named backend is the only one tried and its error is returned as
    /// is. With `Any`, backends are tried in order and the first successful
    /// open wins; if none succeeds the result is [`Error::NotFound`].
    pub fn open_transport(&self, identity: &DeviceIdentity) -> Result<BoxedTransport> {
        if identity.backend != BackendKind::Any {
            let entry = self.candidates(identity.backend).next().ok_or_else(|| {
                log::error!("Backend '{}' is not enabled in this build", identity.backend);
                Error::Unsupported
            })?;
            log::debug!("Opening {} with backend {}", identity, entry.name);
            return (entry.open)(identity);
        }

        for entry in self.candidates(BackendKind::Any) {
            log::debug!("Trying backend {} for {}", entry.name, identity);
            match (entry.open)(identity) {
                Ok(transport) => {
                    log::debug!("Backend {} opened {}", entry.name, identity);
                    return Ok(transport);
                }
                Err(e) => log::debug!("Backend {} failed: {}", entry.name, e),
            }
        }

        log::error!("No backend could open {}", identity);
        Err(Error::NotFound)
    }

    /// Identities of every attached device on the backends `kind` selects.
    ///
    /// A backend whose probe fails is logged and skipped.
    pub fn probe(&self, kind: BackendKind) -> Vec<DeviceIdentity> {
        let mut found = Vec::new();
        for entry in self.candidates(kind) {
            match (entry.probe)() {
                Ok(devices) => found.extend(devices),
                Err(e) => log::warn!("Probing backend {} failed: {}", entry.name, e),
            }
        }
        found
    }
}
