//! Capability layer between a reader session and the hardware.
//!
//! This crate defines the two narrow interfaces a session consumes:
//!
//! - [`ReaderDriver`]: the reader protocol library (init, temperature,
//!   single-tag operations, continuous read, firmware update).
//! - [`GpioPort`]: optional board GPIO (pin setup, writes, change stream).
//!
//! Both are implemented in memory by [`mock::MockReader`] and
//! [`mock::MockGpio`], whose handles script outcomes for tests and
//! development. [`devices`] provides enum dispatch wrappers and
//! [`platform::gpio_supported`] detects GPIO at runtime.
//!
//! ```no_run
//! use readerlink_hardware::{ReaderDriver, Result};
//!
//! async fn probe<D: ReaderDriver>(driver: &D) -> Result<bool> {
//!     let temperature = driver.read_temperature().await?;
//!     Ok(!temperature.is_timeout())
//! }
//! ```

pub mod devices;
pub mod error;
pub mod mock;
pub mod platform;
pub mod traits;
pub mod types;

pub use devices::{AnyGpio, AnyReaderDriver};
pub use error::{DriverError, Result};
pub use traits::{GpioPort, ReaderDriver};
pub use types::{
    BufferedRead, Edge, InitParams, KillRequest, LockRequest, PinChange, PinDirection,
    ReaderInfo, WriteRequest,
};
