//! Core constants for reader session management.
//!
//! This module centralizes the timing, pin and vocabulary constants shared by
//! the session engine, the hardware capability layer and the CLI. The values
//! mirror the behavior of the deployed reader nodes; changing them changes how
//! quickly a session detects failures and recovers.
//!
//! # Usage
//!
//! ```
//! use readerlink_core::constants::*;
//! use std::time::Duration;
//!
//! let probe = Duration::from_millis(DEFAULT_HEALTH_PROBE_MS);
//! assert_eq!(probe.as_secs(), 3);
//! assert!(TASK_NAMES.contains(&"fwupdate"));
//! ```

// ============================================================================
// Timing
// ============================================================================

/// Interval between health probes while the session is `Connected`.
pub const DEFAULT_HEALTH_PROBE_MS: u64 = 3000;

/// Interval between buffered-tag drains during a continuous read.
pub const DEFAULT_READ_TICK_MS: u64 = 500;

/// Delay between entering `Disconnected` and the next `init` attempt.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Settle time before the driver is initialized.
///
/// Gives the serial transport (and the reader power rail, when GPIO is
/// present) time to come up before the first protocol exchange.
pub const DEFAULT_INIT_SETTLE_MS: u64 = 500;

/// Timeout the driver applies internally to its init handshake.
pub const DEFAULT_INIT_TIMEOUT_SECS: u64 = 2;

/// Minimum spacing between two published GPIO input changes.
pub const DEFAULT_DEBOUNCE_MS: u64 = 25;

// ============================================================================
// Reader
// ============================================================================

/// Temperature value the reader reports when the transport timed out.
pub const TEMPERATURE_TIMEOUT_SENTINEL: i16 = -100;

/// Default transmit power handed to the driver (centi-dBm).
pub const DEFAULT_POWER: i32 = 2000;

// ============================================================================
// GPIO pins (physical header numbering)
// ============================================================================

/// Output pin that switches the reader module's power.
pub const DEFAULT_READER_POWER_PIN: u8 = 11;

/// Edge-triggered general-purpose input pin.
pub const DEFAULT_INPUT_PIN: u8 = 15;

/// General-purpose output pin.
pub const DEFAULT_OUTPUT_PIN: u8 = 16;

// ============================================================================
// Vocabulary
// ============================================================================

/// Every task name a command issuer may submit.
pub const TASK_NAMES: [&str; 9] = [
    "read", "write", "start", "stop", "lock", "kill", "info", "reboot", "fwupdate",
];

/// Separator between a task name and its embedded argument (`read:<argument>`).
pub const ARGUMENT_SEPARATOR: char = ':';

/// Topic of tag messages emitted during a continuous read.
pub const TOPIC_TAG: &str = "rfid";

/// Topic of temperature messages emitted during a continuous read.
pub const TOPIC_TEMPERATURE: &str = "temp";

/// Topic of messages published for GPIO input changes.
pub const TOPIC_GPIO_INPUT: &str = "rfid gpi";

/// Payload of tag messages emitted during a continuous read.
pub const CONTINUOUS_READ_PAYLOAD: &str = "continuous read";
