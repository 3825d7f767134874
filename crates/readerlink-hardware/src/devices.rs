//! Enum wrappers for capability dispatch.
//!
//! Traits returning `impl Future` are not object safe, so `Box<dyn
//! ReaderDriver>` is unavailable. These enums give the CLI and other callers
//! one concrete type per capability while keeping static dispatch.
//!
//! # Examples
//!
//! ```
//! use readerlink_hardware::devices::AnyReaderDriver;
//! use readerlink_hardware::mock::MockReader;
//! use readerlink_hardware::traits::ReaderDriver;
//!
//! #[tokio::main]
//! async fn main() -> readerlink_hardware::Result<()> {
//!     let (reader, _handle) = MockReader::new();
//!     let driver = AnyReaderDriver::Mock(reader);
//!
//!     let info = driver.reader_info().await?;
//!     println!("Reader: {}", info.model);
//!     Ok(())
//! }
//! ```

use crate::mock::{MockGpio, MockReader};
use crate::traits::{GpioPort, ReaderDriver};
use crate::types::{
    BufferedRead, Edge, InitParams, KillRequest, LockRequest, PinChange, PinDirection,
    ReaderInfo, WriteRequest,
};
use crate::Result;
use readerlink_core::{TagRecord, Temperature};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Enum wrapper for reader driver dispatch.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnyReaderDriver {
    /// Simulated reader for development and testing.
    Mock(MockReader),
}

impl ReaderDriver for AnyReaderDriver {
    async fn init(&self, params: InitParams) -> Result<()> {
        match self {
            Self::Mock(driver) => driver.init(params).await,
        }
    }

    async fn read_temperature(&self) -> Result<Temperature> {
        match self {
            Self::Mock(driver) => driver.read_temperature().await,
        }
    }

    async fn read_tag(&self, argument: Option<String>) -> Result<TagRecord> {
        match self {
            Self::Mock(driver) => driver.read_tag(argument).await,
        }
    }

    async fn write_tag(&self, request: WriteRequest) -> Result<()> {
        match self {
            Self::Mock(driver) => driver.write_tag(request).await,
        }
    }

    async fn lock_tag(&self, request: LockRequest) -> Result<()> {
        match self {
            Self::Mock(driver) => driver.lock_tag(request).await,
        }
    }

    async fn kill_tag(&self, request: KillRequest) -> Result<()> {
        match self {
            Self::Mock(driver) => driver.kill_tag(request).await,
        }
    }

    async fn reader_info(&self) -> Result<ReaderInfo> {
        match self {
            Self::Mock(driver) => driver.reader_info().await,
        }
    }

    async fn firmware_update(&self, path: PathBuf) -> Result<String> {
        match self {
            Self::Mock(driver) => driver.firmware_update(path).await,
        }
    }

    async fn start_read(&self) -> Result<()> {
        match self {
            Self::Mock(driver) => driver.start_read().await,
        }
    }

    async fn stop_read(&self) -> Result<()> {
        match self {
            Self::Mock(driver) => driver.stop_read().await,
        }
    }

    async fn drain_buffer(&self) -> Result<BufferedRead> {
        match self {
            Self::Mock(driver) => driver.drain_buffer().await,
        }
    }

    async fn destroy(&self) -> Result<()> {
        match self {
            Self::Mock(driver) => driver.destroy().await,
        }
    }
}

/// Enum wrapper for GPIO dispatch.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnyGpio {
    /// In-memory GPIO for development and testing.
    Mock(MockGpio),
}

impl GpioPort for AnyGpio {
    async fn setup(&self, pin: u8, direction: PinDirection, edge: Option<Edge>) -> Result<()> {
        match self {
            Self::Mock(gpio) => gpio.setup(pin, direction, edge).await,
        }
    }

    async fn write(&self, pin: u8, level: bool) -> Result<()> {
        match self {
            Self::Mock(gpio) => gpio.write(pin, level).await,
        }
    }

    fn take_changes(&self) -> Option<mpsc::UnboundedReceiver<PinChange>> {
        match self {
            Self::Mock(gpio) => gpio.take_changes(),
        }
    }

    async fn destroy(&self) -> Result<()> {
        match self {
            Self::Mock(gpio) => gpio.destroy().await,
        }
    }
}
