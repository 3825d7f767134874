//! Request and descriptor types passed across the capability traits.

use readerlink_core::{Region, TagRecord, Temperature};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reader descriptor returned by the `info` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderInfo {
    /// Reader model (e.g., "M6E Nano").
    pub model: String,

    pub serial_number: Option<String>,

    pub firmware_version: Option<String>,

    pub hardware_version: Option<String>,

    /// Region the radio is currently configured for.
    pub region: Option<Region>,
}

impl ReaderInfo {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            serial_number: None,
            firmware_version: None,
            hardware_version: None,
            region: None,
        }
    }

    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    pub fn with_firmware_version(mut self, firmware_version: impl Into<String>) -> Self {
        self.firmware_version = Some(firmware_version.into());
        self
    }

    pub fn with_hardware_version(mut self, hardware_version: impl Into<String>) -> Self {
        self.hardware_version = Some(hardware_version.into());
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }
}

/// Parameters of the driver init handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitParams {
    /// Transport port (e.g., "/dev/ttyUSB0" or "tmr://10.0.0.5").
    pub port: String,

    pub region: Region,

    /// Transmit power as handed to the driver (centi-dBm).
    pub power: i32,

    /// Timeout the driver applies to the handshake itself.
    pub timeout: Duration,
}

/// Tag write request. Fields are already upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriteRequest {
    pub filter: String,
    pub epc: String,
    pub reserved: String,
    pub user: String,
}

/// Tag lock request. Fields are already upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LockRequest {
    pub filter: String,
    pub locks: String,
    pub password: String,
}

/// Tag kill request. Fields are already upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KillRequest {
    pub filter: String,
    pub password: String,
}

/// Result of one buffer drain during a continuous read.
///
/// Tags and temperature come back from the same driver round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedRead {
    pub tags: Vec<TagRecord>,
    pub temperature: Temperature,
}

/// GPIO pin direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinDirection {
    Input,
    Output,
}

/// Edge that triggers change notifications on an input pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

/// A raw level change reported by a GPIO port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinChange {
    pub pin: u8,
    pub level: bool,
}
