//! Error types for the kernel-driver transport

use bladectl_core::Error as CoreError;
use nix::errno::Errno;
use thiserror::Error;

/// Kernel-driver specific errors
#[derive(Debug, Error)]
pub enum KernelError {
    /// No device node matched the identity
    #[error("No /dev/bladerfN node matched the device identity")]
    NoDevice,

    /// Failed to open the device node
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A driver control code failed
    #[error("{request} failed: {source}")]
    Ioctl {
        request: &'static str,
        #[source]
        source: Errno,
    },

    /// Reading or writing the device node failed
    #[error("Device I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The driver returned a value outside its documented range
    #[error("Unexpected {request} result: {value}")]
    UnexpectedValue { request: &'static str, value: i64 },

    /// Core library error
    #[error("Core error: {0}")]
    Core(CoreError),
}

impl From<CoreError> for KernelError {
    fn from(e: CoreError) -> Self {
        KernelError::Core(e)
    }
}

impl From<KernelError> for CoreError {
    fn from(e: KernelError) -> Self {
        log::debug!("Kernel driver error: {}", e);
        match e {
            KernelError::NoDevice => CoreError::NotFound,
            KernelError::OpenFailed { source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound => CoreError::NotFound,
                _ => CoreError::Io,
            },
            KernelError::Ioctl {
                source: Errno::ETIMEDOUT,
                ..
            } => CoreError::Timeout,
            KernelError::Io(source) if source.kind() == std::io::ErrorKind::TimedOut => {
                CoreError::Timeout
            }
            KernelError::UnexpectedValue { .. } => CoreError::Protocol,
            KernelError::Core(inner) => inner,
            KernelError::Ioctl { .. } | KernelError::Io(_) => CoreError::Io,
        }
    }
}

/// Result type for kernel-driver operations
pub type Result<T> = std::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_map_to_timeout() {
        let e = KernelError::Ioctl {
            request: "GPIO_READ",
            source: Errno::ETIMEDOUT,
        };
        assert_eq!(CoreError::from(e), CoreError::Timeout);

        let e = KernelError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert_eq!(CoreError::from(e), CoreError::Timeout);
    }

    #[test]
    fn test_other_failures_map_to_io() {
        let e = KernelError::Ioctl {
            request: "LMS_WRITE",
            source: Errno::EIO,
        };
        assert_eq!(CoreError::from(e), CoreError::Io);
        assert_eq!(CoreError::from(KernelError::NoDevice), CoreError::NotFound);

        let e = KernelError::OpenFailed {
            path: "/dev/bladerf9".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(CoreError::from(e), CoreError::NotFound);
    }

    #[test]
    fn test_display_names_request() {
        let e = KernelError::Ioctl {
            request: "BEGIN_PROG",
            source: Errno::EBUSY,
        };
        assert!(e.to_string().starts_with("BEGIN_PROG failed"));
    }
}
