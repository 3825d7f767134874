//! Reader session configuration.
//!
//! Loaded from TOML. Every field has a default, so a file only needs to name
//! what differs:
//!
//! ```toml
//! port = "/dev/ttyUSB0"
//! region = "EU"
//! power = 2500
//!
//! [timings]
//! health_probe_ms = 5000
//! ```

use readerlink_core::{
    Error, Region, Result,
    constants::{
        DEFAULT_DEBOUNCE_MS, DEFAULT_HEALTH_PROBE_MS, DEFAULT_INIT_SETTLE_MS,
        DEFAULT_INIT_TIMEOUT_SECS, DEFAULT_INPUT_PIN, DEFAULT_OUTPUT_PIN, DEFAULT_POWER,
        DEFAULT_READ_TICK_MS, DEFAULT_READER_POWER_PIN, DEFAULT_RECONNECT_DELAY_MS,
    },
};
use readerlink_hardware::InitParams;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration of one reader session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Transport port handed to the driver. Empty means "not configured".
    pub port: String,

    /// Regulatory region. Unknown codes deserialize to `None`.
    #[serde(deserialize_with = "lenient_region")]
    pub region: Option<Region>,

    /// Transmit power (centi-dBm).
    pub power: i32,

    pub timings: SessionTimings,

    pub pins: GpioPins,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            region: None,
            power: DEFAULT_POWER,
            timings: SessionTimings::default(),
            pins: GpioPins::default(),
        }
    }
}

impl ReaderConfig {
    pub fn new(port: impl Into<String>, region: Option<Region>) -> Self {
        Self {
            port: port.into(),
            region,
            ..Self::default()
        }
    }

    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid TOML, a field has
    /// the wrong type or a timer interval is zero.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.timings.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::Config`] if it cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Both port and region are set.
    pub fn is_configured(&self) -> bool {
        !self.port.is_empty() && self.region.is_some()
    }

    /// Driver init parameters, or `None` when not configured.
    pub fn init_params(&self) -> Option<InitParams> {
        let region = self.region?;
        if self.port.is_empty() {
            return None;
        }
        Some(InitParams {
            port: self.port.clone(),
            region,
            power: self.power,
            timeout: self.timings.init_timeout(),
        })
    }
}

fn lenient_region<'de, D>(deserializer: D) -> std::result::Result<Option<Region>, D::Error>
where
    D: Deserializer<'de>,
{
    let code = Option::<String>::deserialize(deserializer)?;
    Ok(code.as_deref().and_then(Region::from_code))
}

/// Session timer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTimings {
    pub health_probe_ms: u64,
    pub read_tick_ms: u64,
    pub reconnect_delay_ms: u64,
    pub init_settle_ms: u64,
    pub init_timeout_secs: u64,
    pub debounce_ms: u64,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            health_probe_ms: DEFAULT_HEALTH_PROBE_MS,
            read_tick_ms: DEFAULT_READ_TICK_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            init_settle_ms: DEFAULT_INIT_SETTLE_MS,
            init_timeout_secs: DEFAULT_INIT_TIMEOUT_SECS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl SessionTimings {
    /// Reject intervals a periodic timer cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first zero interval.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("health_probe_ms", self.health_probe_ms),
            ("read_tick_ms", self.read_tick_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("timings.{name} must be non-zero")));
            }
        }
        Ok(())
    }

    pub fn health_probe(&self) -> Duration {
        Duration::from_millis(self.health_probe_ms)
    }

    pub fn read_tick(&self) -> Duration {
        Duration::from_millis(self.read_tick_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn init_settle(&self) -> Duration {
        Duration::from_millis(self.init_settle_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// GPIO pin assignment (physical header numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioPins {
    /// Output switching the reader module's power.
    pub reader_power: u8,
    pub input: u8,
    pub output: u8,
}

impl Default for GpioPins {
    fn default() -> Self {
        Self {
            reader_power: DEFAULT_READER_POWER_PIN,
            input: DEFAULT_INPUT_PIN,
            output: DEFAULT_OUTPUT_PIN,
        }
    }
}
