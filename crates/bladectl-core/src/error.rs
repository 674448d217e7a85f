//! Error types for bladectl-core
//!
//! A single `Copy` error enum shared by every backend. Backend crates keep
//! their own richer errors and convert into this one at the trait boundary.

use core::fmt;

/// Why a device specifier string was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// Backend keyword is not one of the known backends
    UnknownBackend,
    /// `key=value` pair with an unrecognized key
    UnknownKey,
    /// Key given without a value
    MissingValue,
    /// `device=` value is not of the form `bus:addr`
    MalformedAddress,
    /// Value could not be parsed as a number
    InvalidNumber,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Malformed device specifier
    Parse(ParseFailure),
    /// No device matched the requested identity
    NotFound,
    /// Transport-level failure (USB stall, driver error, short transfer)
    Io,
    /// Operation exceeded its deadline
    Timeout,
    /// Requested frequency or rate is outside the supported range
    OutOfRange(u64),
    /// VCO capacitor sweep found no lock transition
    Calibration,
    /// Operation is not implemented by the selected backend
    Unsupported,
    /// Provided buffer is too small for the operation
    BufferTooSmall,
    /// Read-back after programming did not match
    Verify {
        /// Byte offset of the first mismatch
        offset: u32,
    },
    /// Device answered with something that is not a valid response
    Protocol,
}

impl Error {
    /// Whether retrying the same request may succeed.
    ///
    /// Only transport failures and timeouts are transient; everything else
    /// describes a structural problem that a retry will hit again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io | Self::Timeout)
    }
}

impl From<ParseFailure> for Error {
    fn from(failure: ParseFailure) -> Self {
        Self::Parse(failure)
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownBackend => write!(f, "unknown backend"),
            Self::UnknownKey => write!(f, "unknown key"),
            Self::MissingValue => write!(f, "missing value"),
            Self::MalformedAddress => write!(f, "malformed device address (expected bus:addr)"),
            Self::InvalidNumber => write!(f, "invalid number"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(failure) => write!(f, "invalid device specifier: {}", failure),
            Self::NotFound => write!(f, "no matching device found"),
            Self::Io => write!(f, "I/O error"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::OutOfRange(value) => write!(f, "value {} out of range", value),
            Self::Calibration => write!(f, "VCO calibration found no lock transition"),
            Self::Unsupported => write!(f, "operation not supported by this backend"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::Verify { offset } => {
                write!(f, "verify failed: data mismatch at 0x{:08X}", offset)
            }
            Self::Protocol => write!(f, "unexpected response from device"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
