//! GPIO input debouncing and output level parsing.
//!
//! GPIO is independent of the reader lifecycle: nothing here touches session
//! state, and a failing pin never moves the state machine.

use crate::error::SessionError;
use readerlink_core::Message;
use readerlink_hardware::PinChange;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Debounce for one input pin.
///
/// A change is published only when it arrives more than `window` after the
/// last published change and differs from the last published value.
#[derive(Debug, Clone)]
pub struct Debouncer {
    pin: u8,
    window: Duration,
    last_change: Option<Instant>,
    last_value: Option<u8>,
}

impl Debouncer {
    pub fn new(pin: u8, window: Duration) -> Self {
        Self {
            pin,
            window,
            last_change: None,
            last_value: None,
        }
    }

    /// Returns the value to publish, if any.
    pub fn accept(&mut self, change: PinChange, now: Instant) -> Option<u8> {
        if change.pin != self.pin {
            return None;
        }

        let settled = self
            .last_change
            .is_none_or(|last| now.saturating_duration_since(last) > self.window);
        let value = u8::from(change.level);
        if !settled || self.last_value == Some(value) {
            return None;
        }

        self.last_change = Some(now);
        self.last_value = Some(value);
        Some(value)
    }
}

/// Parse the level of an output write. Only the numbers 0 and 1 are valid.
///
/// # Errors
///
/// Returns [`SessionError::InvalidLevel`] for any other payload.
pub fn parse_output_level(message: &Message) -> Result<bool, SessionError> {
    match &message.payload {
        Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
        Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
        _ => Err(SessionError::InvalidLevel(message.payload_text())),
    }
}
