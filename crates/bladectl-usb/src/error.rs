//! Error types for the USB transport

use std::fmt;

use bladectl_core::Error as CoreError;
use nusb::transfer::TransferError;

/// Result type for USB transport operations
pub type Result<T> = std::result::Result<T, UsbError>;

/// Errors that can occur talking to a device over USB
#[derive(Debug)]
pub enum UsbError {
    /// No device matched the identity
    DeviceNotFound,
    /// Failed to open the device
    OpenFailed(String),
    /// Failed to claim the interface or select an alternate setting
    ClaimFailed(String),
    /// USB transfer failed
    TransferFailed(String),
    /// The device did not answer in time
    Timeout,
    /// Malformed or unexpected response
    InvalidResponse(String),
    /// The device firmware rejected a request with a status code
    Rejected {
        /// Vendor request code
        request: u8,
        /// Status the firmware returned
        status: i32,
    },
    /// Core library error
    Core(CoreError),
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbError::DeviceNotFound => write!(f, "bladeRF device not found (VID:1D50 PID:6066)"),
            UsbError::OpenFailed(msg) => write!(f, "Failed to open bladeRF: {}", msg),
            UsbError::ClaimFailed(msg) => write!(f, "Failed to claim interface: {}", msg),
            UsbError::TransferFailed(msg) => write!(f, "USB transfer failed: {}", msg),
            UsbError::Timeout => write!(f, "Timeout during USB transfer"),
            UsbError::InvalidResponse(msg) => write!(f, "Invalid response from bladeRF: {}", msg),
            UsbError::Rejected { request, status } => {
                write!(f, "Vendor request {} failed with status {}", request, status)
            }
            UsbError::Core(e) => write!(f, "Core error: {}", e),
        }
    }
}

impl std::error::Error for UsbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UsbError::Core(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CoreError> for UsbError {
    fn from(e: CoreError) -> Self {
        UsbError::Core(e)
    }
}

impl From<nusb::Error> for UsbError {
    fn from(e: nusb::Error) -> Self {
        UsbError::TransferFailed(e.to_string())
    }
}

impl From<TransferError> for UsbError {
    fn from(e: TransferError) -> Self {
        match e {
            // Transfers that exceed their timeout are cancelled by nusb
            TransferError::Cancelled => UsbError::Timeout,
            other => UsbError::TransferFailed(other.to_string()),
        }
    }
}

impl From<UsbError> for CoreError {
    fn from(e: UsbError) -> Self {
        log::debug!("USB error: {}", e);
        match e {
            UsbError::DeviceNotFound => CoreError::NotFound,
            UsbError::Timeout => CoreError::Timeout,
            UsbError::InvalidResponse(_) => CoreError::Protocol,
            UsbError::Core(inner) => inner,
            UsbError::OpenFailed(_)
            | UsbError::ClaimFailed(_)
            | UsbError::TransferFailed(_)
            | UsbError::Rejected { .. } => CoreError::Io,
        }
    }
}
