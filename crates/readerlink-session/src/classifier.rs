//! Error classification.
//!
//! Every session-level failure is reduced to an [`ErrorVerdict`]: the text
//! shown to subscribers and whether the session must tear the device down
//! and reconnect (fatal) or may resume as connected (non-fatal).

use readerlink_hardware::DriverError;

/// Substring of the OS error reported when the transport port is missing.
const MISSING_FILE: &str = "No such file or directory";

pub const PORT_NOT_FOUND: &str = "port not found";
pub const CONNECTION_TIMEOUT: &str = "connection timeout";
pub const CONNECTION_NULL: &str = "connection null";
pub const NOT_CONFIGURED: &str = "no port or region selected";
pub const PROBE_TIMEOUT: &str = "connectionTimeout";
pub const REBOOT: &str = "reboot";

/// Messages that always mean the reader link is gone.
const FATAL_MESSAGES: [&str; 6] = [
    CONNECTION_TIMEOUT,
    CONNECTION_NULL,
    PORT_NOT_FOUND,
    NOT_CONFIGURED,
    PROBE_TIMEOUT,
    REBOOT,
];

/// Raw cause of a session fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultCause {
    /// The driver init handshake failed.
    Init(DriverError),

    /// A task or health probe failed in the driver.
    Driver(DriverError),

    /// Draining the buffer during a continuous read failed.
    ContinuousRead(DriverError),

    /// The reader answered a temperature probe with the timeout sentinel.
    ConnectionTimeout,

    /// Port or region is missing from the configuration.
    Misconfigured,

    /// The reader must restart (explicit `reboot` or after `fwupdate`).
    Reboot,

    Other(String),
}

/// Outcome of classifying a [`FaultCause`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorVerdict {
    pub message: String,

    /// Drive the session to `Disconnected` and reconnect.
    pub fatal: bool,

    /// Power-cycle the reader during teardown.
    pub reset_device: bool,
}

impl ErrorVerdict {
    /// Force this verdict fatal.
    ///
    /// Used for faults raised before the reader ever connected, where
    /// resuming as connected is impossible.
    pub fn escalate(mut self) -> Self {
        if !self.fatal {
            self.fatal = true;
            self.reset_device = true;
        }
        self
    }
}

/// Classify a fault.
///
/// # Examples
///
/// ```
/// use readerlink_hardware::DriverError;
/// use readerlink_session::classifier::{FaultCause, classify};
///
/// let verdict = classify(&FaultCause::Driver(DriverError::tag("no tag found")));
/// assert!(!verdict.fatal);
/// assert_eq!(verdict.message, "no tag found");
///
/// let verdict = classify(&FaultCause::Reboot);
/// assert!(verdict.fatal);
/// ```
pub fn classify(cause: &FaultCause) -> ErrorVerdict {
    let (raw, link_failure) = match cause {
        FaultCause::Init(DriverError::Timeout { .. }) => (CONNECTION_TIMEOUT.to_string(), true),
        FaultCause::Init(err) => (format!("connection {}", err.detail()), is_link_failure(err)),
        FaultCause::Driver(err) => (err.detail(), is_link_failure(err)),
        FaultCause::ContinuousRead(err) => (err.detail(), true),
        FaultCause::ConnectionTimeout => (PROBE_TIMEOUT.to_string(), false),
        FaultCause::Misconfigured => (NOT_CONFIGURED.to_string(), false),
        FaultCause::Reboot => (REBOOT.to_string(), false),
        FaultCause::Other(message) => (message.clone(), false),
    };

    let message = if raw.contains(MISSING_FILE) {
        PORT_NOT_FOUND.to_string()
    } else {
        raw
    };

    let fatal = link_failure || FATAL_MESSAGES.contains(&message.as_str());
    let reset_device = fatal && !matches!(cause, FaultCause::Misconfigured);

    ErrorVerdict {
        message,
        fatal,
        reset_device,
    }
}

/// Whether the error class itself means the transport is unusable.
fn is_link_failure(err: &DriverError) -> bool {
    matches!(
        err,
        DriverError::Communication { .. }
            | DriverError::Timeout { .. }
            | DriverError::PortNotFound { .. }
            | DriverError::Io { .. }
    )
}
