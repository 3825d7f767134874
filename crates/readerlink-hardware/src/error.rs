//! Error types for reader driver and GPIO operations.
//!
//! Driver errors are cloneable so a single failure can be reported to the
//! issuing subscriber and handed to the error classifier.

use std::io;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors reported by a [`ReaderDriver`](crate::traits::ReaderDriver) or
/// [`GpioPort`](crate::traits::GpioPort).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// The reader protocol exchange failed (reader communication exception).
    #[error("Reader communication error: {message}")]
    Communication { message: String },

    /// The driver gave up waiting for the reader.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The configured transport port does not exist.
    #[error("Port not found: {port}")]
    PortNotFound { port: String },

    /// Transport I/O failure.
    #[error("I/O error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },

    /// A tag-level operation failed (no tag in field, wrong password, ...).
    #[error("Tag operation failed: {message}")]
    Tag { message: String },

    /// Driver initialization failed for a reason other than a timeout.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// Operation is not supported by this driver.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// The reader returned data the driver could not decode.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// GPIO pin setup or write failed.
    #[error("GPIO error: {message}")]
    Gpio { message: String },

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl DriverError {
    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    pub fn port_not_found(port: impl Into<String>) -> Self {
        Self::PortNotFound { port: port.into() }
    }

    pub fn tag(message: impl Into<String>) -> Self {
        Self::Tag {
            message: message.into(),
        }
    }

    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn gpio(message: impl Into<String>) -> Self {
        Self::Gpio {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// The inner message of this error, without the variant prefix.
    ///
    /// This is the text subscribers see after `"<task> failed: "`.
    pub fn detail(&self) -> String {
        match self {
            Self::Communication { message }
            | Self::Tag { message }
            | Self::InitializationFailed { message }
            | Self::InvalidData { message }
            | Self::Gpio { message }
            | Self::Io { message, .. } => message.clone(),
            Self::Timeout { .. } => "connection timeout".to_string(),
            Self::PortNotFound { .. } => "port not found".to_string(),
            Self::Unsupported { operation } => format!("unsupported operation {operation}"),
            Self::Other(message) => message.clone(),
        }
    }
}

impl From<io::Error> for DriverError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error() {
        let error = DriverError::timeout(2000);
        assert!(matches!(error, DriverError::Timeout { .. }));
        assert_eq!(error.to_string(), "Operation timeout after 2000ms");
        assert_eq!(error.detail(), "connection timeout");
    }

    #[test]
    fn test_port_not_found_error() {
        let error = DriverError::port_not_found("/dev/ttyUSB0");
        assert_eq!(error.to_string(), "Port not found: /dev/ttyUSB0");
        assert_eq!(error.detail(), "port not found");
    }

    #[test]
    fn test_communication_detail_strips_prefix() {
        let error = DriverError::communication("CRC mismatch");
        assert_eq!(error.to_string(), "Reader communication error: CRC mismatch");
        assert_eq!(error.detail(), "CRC mismatch");
    }

    #[test]
    fn test_from_io_error_keeps_kind() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "No such file or directory");
        let error = DriverError::from(io_err);

        match &error {
            DriverError::Io { kind, message } => {
                assert_eq!(*kind, io::ErrorKind::NotFound);
                assert_eq!(message, "No such file or directory");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert_eq!(error.detail(), "No such file or directory");
    }

    #[test]
    fn test_error_is_cloneable() {
        let error = DriverError::tag("no tag in field");
        assert_eq!(error.clone(), error);
    }
}
