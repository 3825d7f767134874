//! Capability trait definitions.
//!
//! [`ReaderDriver`] is the narrow interface to the reader protocol library and
//! [`GpioPort`] the optional interface to board GPIO. The session consumes
//! both through generics, so real drivers and the mocks in [`crate::mock`]
//! are interchangeable.
//!
//! Methods return `impl Future + Send` rather than being declared `async fn`:
//! the session spawns every driver call onto the runtime, which needs the
//! futures to be `Send`. Implementations are free to write `async fn`.

use crate::error::Result;
use crate::types::{
    BufferedRead, Edge, InitParams, KillRequest, LockRequest, PinChange, PinDirection,
    ReaderInfo, WriteRequest,
};
use readerlink_core::{TagRecord, Temperature};
use std::future::Future;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Reader protocol driver.
///
/// Every operation completes asynchronously with either a value or a
/// [`DriverError`](crate::DriverError). Calls are never cancelled once
/// issued; drivers are expected to time out internally.
pub trait ReaderDriver: Send + Sync + 'static {
    /// Open the transport and configure region and power.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The port does not exist
    /// - The reader did not answer within `params.timeout`
    /// - The reader rejected the configuration
    fn init(&self, params: InitParams) -> impl Future<Output = Result<()>> + Send;

    /// Read the reader temperature.
    ///
    /// A transport timeout may be reported as [`Temperature::TIMEOUT`]
    /// instead of an error.
    fn read_temperature(&self) -> impl Future<Output = Result<Temperature>> + Send;

    /// Read a single tag. `argument` is driver specific (e.g., an antenna
    /// selector).
    fn read_tag(&self, argument: Option<String>)
    -> impl Future<Output = Result<TagRecord>> + Send;

    fn write_tag(&self, request: WriteRequest) -> impl Future<Output = Result<()>> + Send;

    fn lock_tag(&self, request: LockRequest) -> impl Future<Output = Result<()>> + Send;

    fn kill_tag(&self, request: KillRequest) -> impl Future<Output = Result<()>> + Send;

    fn reader_info(&self) -> impl Future<Output = Result<ReaderInfo>> + Send;

    /// Flash the firmware image at `path`, returning the driver's output.
    fn firmware_update(&self, path: PathBuf) -> impl Future<Output = Result<String>> + Send;

    /// Put the reader into continuous read mode.
    fn start_read(&self) -> impl Future<Output = Result<()>> + Send;

    fn stop_read(&self) -> impl Future<Output = Result<()>> + Send;

    /// Fetch (and clear) the tags buffered since the last drain, together
    /// with the current temperature.
    fn drain_buffer(&self) -> impl Future<Output = Result<BufferedRead>> + Send;

    /// Release the transport. The driver must be re-initialized afterwards.
    fn destroy(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Board GPIO.
///
/// Pins use physical header numbering. Absence of GPIO is detected at
/// runtime by [`crate::platform::gpio_supported`]; a session without a port
/// simply never calls these methods.
pub trait GpioPort: Send + Sync + 'static {
    /// Configure a pin. `edge` selects change notifications for inputs.
    fn setup(
        &self,
        pin: u8,
        direction: PinDirection,
        edge: Option<Edge>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Drive an output pin.
    fn write(&self, pin: u8, level: bool) -> impl Future<Output = Result<()>> + Send;

    /// Take the stream of raw input changes.
    ///
    /// Returns `Some` only on the first call.
    fn take_changes(&self) -> Option<mpsc::UnboundedReceiver<PinChange>>;

    /// Release every pin.
    fn destroy(&self) -> impl Future<Output = Result<()>> + Send;
}
