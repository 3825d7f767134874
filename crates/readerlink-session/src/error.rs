//! Session error types.

use crate::registry::SubscriberId;
use readerlink_core::{Message, Operation};
use readerlink_hardware::DriverError;
use std::fmt;

/// Errors returned by [`SessionHandle`](crate::SessionHandle) methods other
/// than `submit`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session closed")]
    Closed,

    #[error("no gpio found")]
    GpioUnavailable,

    /// Output writes accept only 0 or 1.
    #[error("invalid gpio level: {0}")]
    InvalidLevel(String),

    #[error("unknown subscriber: {0}")]
    UnknownSubscriber(SubscriberId),

    #[error("GPIO failure: {0}")]
    Gpio(#[from] DriverError),

    #[error(transparent)]
    Config(#[from] readerlink_core::Error),
}

/// Why a submitted command was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The session is not connected.
    NotAvailable,
    /// The payload does not name a known task.
    InvalidOperation,
    /// The payload is not a string.
    NotAString,
    /// The exclusive slot is held.
    Busy,
    /// The issuer is not a registered command issuer.
    UnknownIssuer,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NotAvailable => "not available",
            Self::InvalidOperation => "invalid operation",
            Self::NotAString => "payload not a string",
            Self::Busy => "busy",
            Self::UnknownIssuer => "unknown issuer",
        };
        f.write_str(reason)
    }
}

/// A rejected submission together with the failure message for the issuer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", message.payload_text())]
pub struct Rejection {
    pub reason: RejectReason,
    pub message: Message,
}

impl Rejection {
    pub(crate) fn new(reason: RejectReason, message: Message) -> Self {
        Self { reason, message }
    }
}

/// An accepted submission. Its result arrives on the issuer's message stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub operation: Operation,
}
