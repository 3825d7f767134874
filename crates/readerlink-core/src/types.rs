use crate::{
    Result,
    constants::{CONTINUOUS_READ_PAYLOAD, TEMPERATURE_TIMEOUT_SENTINEL},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Regulatory region the reader radio is configured for.
///
/// The numeric value is the code the reader driver expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    /// North America.
    NA = 1,
    /// India.
    IN = 2,
    /// Japan.
    JP = 3,
    /// China.
    CN = 4,
    /// European Union.
    EU = 5,
    /// Korea.
    KR = 6,
    /// Australia.
    AU = 7,
    /// New Zealand.
    NZ = 8,
}

impl Region {
    /// All supported regions, ordered by driver code.
    pub const ALL: [Region; 8] = [
        Region::NA,
        Region::IN,
        Region::JP,
        Region::CN,
        Region::EU,
        Region::KR,
        Region::AU,
        Region::NZ,
    ];

    /// Parse a two-letter region code.
    ///
    /// Returns `None` for anything that is not one of the eight known codes,
    /// which the session treats as "no region selected".
    ///
    /// # Examples
    ///
    /// ```
    /// use readerlink_core::Region;
    ///
    /// assert_eq!(Region::from_code("EU"), Some(Region::EU));
    /// assert_eq!(Region::from_code("XX"), None);
    /// ```
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|region| region.as_str() == code)
    }

    /// Numeric code handed to the driver.
    #[must_use]
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Two-letter code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NA => "NA",
            Self::IN => "IN",
            Self::JP => "JP",
            Self::CN => "CN",
            Self::EU => "EU",
            Self::KR => "KR",
            Self::AU => "AU",
            Self::NZ => "NZ",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_code(s).ok_or_else(|| Error::InvalidRegion(s.to_string()))
    }
}

/// Reader temperature in degrees Celsius.
///
/// A reading equal to [`TEMPERATURE_TIMEOUT_SENTINEL`] is not a temperature:
/// the reader reports it when the transport timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temperature(i16);

impl Temperature {
    /// The timeout sentinel reading.
    pub const TIMEOUT: Temperature = Temperature(TEMPERATURE_TIMEOUT_SENTINEL);

    pub fn celsius(value: i16) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn value(&self) -> i16 {
        self.0
    }

    /// Whether this reading is the transport-timeout sentinel.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.0 == TEMPERATURE_TIMEOUT_SENTINEL
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}°C", self.0)
    }
}

/// Result of a tag read.
///
/// Carries the EPC and whichever additional memory banks the reader was
/// asked to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    /// Electronic Product Code, hex encoded.
    pub epc: String,

    /// Reserved memory bank (kill and access passwords).
    pub reserved: Option<String>,

    /// Tag identifier memory bank.
    pub tid: Option<String>,

    /// User memory bank.
    pub user: Option<String>,
}

impl TagRecord {
    /// Create a record holding only an EPC.
    pub fn new(epc: impl Into<String>) -> Self {
        Self {
            epc: epc.into(),
            reserved: None,
            tid: None,
            user: None,
        }
    }

    pub fn with_reserved(mut self, reserved: impl Into<String>) -> Self {
        self.reserved = Some(reserved.into());
        self
    }

    pub fn with_tid(mut self, tid: impl Into<String>) -> Self {
        self.tid = Some(tid.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// A task name from the command vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Read,
    Write,
    Start,
    Stop,
    Lock,
    Kill,
    Info,
    Reboot,
    #[serde(rename = "fwupdate")]
    FirmwareUpdate,
}

impl TaskKind {
    pub const ALL: [TaskKind; 9] = [
        TaskKind::Read,
        TaskKind::Write,
        TaskKind::Start,
        TaskKind::Stop,
        TaskKind::Lock,
        TaskKind::Kill,
        TaskKind::Info,
        TaskKind::Reboot,
        TaskKind::FirmwareUpdate,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Lock => "lock",
            Self::Kill => "kill",
            Self::Info => "info",
            Self::Reboot => "reboot",
            Self::FirmwareUpdate => "fwupdate",
        }
    }

    /// Operation label the session reports while this task is in flight.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::Start => Operation::ContinuousRead,
            other => Operation::Task(*other),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidOperation(s.to_string()))
    }
}

/// Label of the operation currently occupying the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// A one-shot task.
    Task(TaskKind),

    /// A running continuous read (entered through `start`).
    ContinuousRead,
}

impl Operation {
    #[must_use]
    pub fn is_continuous_read(&self) -> bool {
        matches!(self, Self::ContinuousRead)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Task(kind) => f.write_str(kind.as_str()),
            Self::ContinuousRead => f.write_str(CONTINUOUS_READ_PAYLOAD),
        }
    }
}
