//! Mock reader driver for testing and development.
//!
//! The mock answers every driver call from scripted state shared with a
//! [`MockReaderHandle`]. Tests use the handle to queue failures, inject
//! latency, script temperatures and inspect how often each call was made.

use crate::{
    DriverError, Result,
    traits::ReaderDriver,
    types::{BufferedRead, InitParams, KillRequest, LockRequest, ReaderInfo, WriteRequest},
};
use readerlink_core::{TagRecord, Temperature};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Driver call identifiers used for scripting and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    Init,
    Temperature,
    ReadTag,
    WriteTag,
    LockTag,
    KillTag,
    Info,
    FirmwareUpdate,
    StartRead,
    StopRead,
    DrainBuffer,
    Destroy,
}

const DEFAULT_TEMPERATURE: i16 = 23;
const DEFAULT_EPC: &str = "E20000172211010218905459";

#[derive(Debug)]
struct State {
    open: bool,
    latency: HashMap<DriverOp, Duration>,
    one_shot: HashMap<DriverOp, VecDeque<DriverError>>,
    persistent: HashMap<DriverOp, DriverError>,
    calls: HashMap<DriverOp, usize>,
    temperatures: VecDeque<Temperature>,
    temperature: Temperature,
    tag: TagRecord,
    buffered: Vec<TagRecord>,
    info: ReaderInfo,
    firmware_output: String,
    last_init: Option<InitParams>,
    last_read_argument: Option<String>,
    last_write: Option<WriteRequest>,
    last_lock: Option<LockRequest>,
    last_kill: Option<KillRequest>,
    last_firmware_path: Option<PathBuf>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            open: false,
            latency: HashMap::new(),
            one_shot: HashMap::new(),
            persistent: HashMap::new(),
            calls: HashMap::new(),
            temperatures: VecDeque::new(),
            temperature: Temperature::celsius(DEFAULT_TEMPERATURE),
            tag: TagRecord::new(DEFAULT_EPC),
            buffered: Vec::new(),
            info: ReaderInfo::new("Mock UHF Reader")
                .with_serial_number("MOCK-0001")
                .with_firmware_version("1.0.0"),
            firmware_output: "firmware updated".to_string(),
            last_init: None,
            last_read_argument: None,
            last_write: None,
            last_lock: None,
            last_kill: None,
            last_firmware_path: None,
        }
    }
}

impl State {
    /// Count the call and decide its scripted outcome.
    fn begin(&mut self, op: DriverOp) -> (Duration, Result<()>) {
        *self.calls.entry(op).or_insert(0) += 1;
        let latency = self.latency.get(&op).copied().unwrap_or_default();

        let scripted = self
            .one_shot
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.persistent.get(&op).cloned());

        (latency, scripted.map_or(Ok(()), Err))
    }

    fn next_temperature(&mut self) -> Temperature {
        self.temperatures.pop_front().unwrap_or(self.temperature)
    }
}

type Shared = Arc<Mutex<State>>;

fn lock(shared: &Shared) -> MutexGuard<'_, State> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock reader driver.
///
/// # Examples
///
/// ```
/// use readerlink_hardware::mock::{DriverOp, MockReader};
/// use readerlink_hardware::traits::ReaderDriver;
/// use readerlink_hardware::DriverError;
///
/// #[tokio::main]
/// async fn main() {
///     let (reader, handle) = MockReader::new();
///
///     handle.fail_next(DriverOp::ReadTag, DriverError::tag("no tag in field"));
///     assert!(reader.read_tag(None).await.is_err());
///     assert!(reader.read_tag(None).await.is_ok());
///     assert_eq!(handle.calls(DriverOp::ReadTag), 2);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockReader {
    shared: Shared,
}

impl MockReader {
    /// Create a mock reader and its control handle.
    pub fn new() -> (Self, MockReaderHandle) {
        let shared = Arc::new(Mutex::new(State::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockReaderHandle { shared },
        )
    }

    async fn run(&self, op: DriverOp) -> Result<()> {
        let (latency, outcome) = lock(&self.shared).begin(op);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        tracing::trace!(?op, ok = outcome.is_ok(), "mock driver call");
        outcome
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut lock(&self.shared))
    }
}

impl Default for MockReader {
    fn default() -> Self {
        Self::new().0
    }
}

impl ReaderDriver for MockReader {
    async fn init(&self, params: InitParams) -> Result<()> {
        self.with_state(|s| s.last_init = Some(params));
        self.run(DriverOp::Init).await?;
        self.with_state(|s| s.open = true);
        Ok(())
    }

    async fn read_temperature(&self) -> Result<Temperature> {
        self.run(DriverOp::Temperature).await?;
        Ok(self.with_state(State::next_temperature))
    }

    async fn read_tag(&self, argument: Option<String>) -> Result<TagRecord> {
        self.with_state(|s| s.last_read_argument = argument);
        self.run(DriverOp::ReadTag).await?;
        Ok(self.with_state(|s| s.tag.clone()))
    }

    async fn write_tag(&self, request: WriteRequest) -> Result<()> {
        self.with_state(|s| s.last_write = Some(request));
        self.run(DriverOp::WriteTag).await
    }

    async fn lock_tag(&self, request: LockRequest) -> Result<()> {
        self.with_state(|s| s.last_lock = Some(request));
        self.run(DriverOp::LockTag).await
    }

    async fn kill_tag(&self, request: KillRequest) -> Result<()> {
        self.with_state(|s| s.last_kill = Some(request));
        self.run(DriverOp::KillTag).await
    }

    async fn reader_info(&self) -> Result<ReaderInfo> {
        self.run(DriverOp::Info).await?;
        Ok(self.with_state(|s| s.info.clone()))
    }

    async fn firmware_update(&self, path: PathBuf) -> Result<String> {
        self.with_state(|s| s.last_firmware_path = Some(path));
        self.run(DriverOp::FirmwareUpdate).await?;
        Ok(self.with_state(|s| s.firmware_output.clone()))
    }

    async fn start_read(&self) -> Result<()> {
        self.run(DriverOp::StartRead).await
    }

    async fn stop_read(&self) -> Result<()> {
        self.run(DriverOp::StopRead).await
    }

    async fn drain_buffer(&self) -> Result<BufferedRead> {
        self.run(DriverOp::DrainBuffer).await?;
        Ok(self.with_state(|s| BufferedRead {
            tags: s.buffered.clone(),
            temperature: s.next_temperature(),
        }))
    }

    async fn destroy(&self) -> Result<()> {
        self.with_state(|s| s.open = false);
        self.run(DriverOp::Destroy).await
    }
}

/// Handle for scripting and inspecting a [`MockReader`].
#[derive(Debug, Clone)]
pub struct MockReaderHandle {
    shared: Shared,
}

impl MockReaderHandle {
    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut lock(&self.shared))
    }

    /// Fail the next call of `op` with `error`. Queued failures are consumed
    /// in order.
    pub fn fail_next(&self, op: DriverOp, error: DriverError) {
        self.with_state(|s| s.one_shot.entry(op).or_default().push_back(error));
    }

    /// Fail every call of `op` until [`clear_failures`](Self::clear_failures).
    pub fn fail_always(&self, op: DriverOp, error: DriverError) {
        self.with_state(|s| {
            s.persistent.insert(op, error);
        });
    }

    pub fn clear_failures(&self, op: DriverOp) {
        self.with_state(|s| {
            s.one_shot.remove(&op);
            s.persistent.remove(&op);
        });
    }

    /// Delay every call of `op` by `latency` before it completes.
    pub fn set_latency(&self, op: DriverOp, latency: Duration) {
        self.with_state(|s| {
            s.latency.insert(op, latency);
        });
    }

    /// Temperature reported once scripted readings are exhausted.
    pub fn set_temperature(&self, temperature: Temperature) {
        self.with_state(|s| s.temperature = temperature);
    }

    /// Queue a one-off temperature reading.
    pub fn push_temperature(&self, temperature: Temperature) {
        self.with_state(|s| s.temperatures.push_back(temperature));
    }

    /// Tag returned by `read_tag`.
    pub fn set_tag(&self, tag: TagRecord) {
        self.with_state(|s| s.tag = tag);
    }

    /// Tags returned by every `drain_buffer`.
    pub fn set_buffered_tags(&self, tags: Vec<TagRecord>) {
        self.with_state(|s| s.buffered = tags);
    }

    pub fn set_info(&self, info: ReaderInfo) {
        self.with_state(|s| s.info = info);
    }

    pub fn set_firmware_output(&self, output: impl Into<String>) {
        let output = output.into();
        self.with_state(|s| s.firmware_output = output);
    }

    /// Number of times `op` was called.
    pub fn calls(&self, op: DriverOp) -> usize {
        self.with_state(|s| s.calls.get(&op).copied().unwrap_or(0))
    }

    /// Whether the transport is open (initialized and not destroyed).
    pub fn is_open(&self) -> bool {
        self.with_state(|s| s.open)
    }

    pub fn last_init(&self) -> Option<InitParams> {
        self.with_state(|s| s.last_init.clone())
    }

    pub fn last_read_argument(&self) -> Option<String> {
        self.with_state(|s| s.last_read_argument.clone())
    }

    pub fn last_write(&self) -> Option<WriteRequest> {
        self.with_state(|s| s.last_write.clone())
    }

    pub fn last_lock(&self) -> Option<LockRequest> {
        self.with_state(|s| s.last_lock.clone())
    }

    pub fn last_kill(&self) -> Option<KillRequest> {
        self.with_state(|s| s.last_kill.clone())
    }

    pub fn last_firmware_path(&self) -> Option<PathBuf> {
        self.with_state(|s| s.last_firmware_path.clone())
    }
}
