//! Mock GPIO port.

use crate::{
    DriverError, Result,
    traits::GpioPort,
    types::{Edge, PinChange, PinDirection},
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// A recorded `setup` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinSetup {
    pub pin: u8,
    pub direction: PinDirection,
    pub edge: Option<Edge>,
}

#[derive(Debug, Default)]
struct State {
    setups: Vec<PinSetup>,
    writes: Vec<(u8, bool)>,
    destroys: usize,
    fail_writes: bool,
    changes_rx: Option<mpsc::UnboundedReceiver<PinChange>>,
}

type Shared = Arc<Mutex<State>>;

fn lock(shared: &Shared) -> MutexGuard<'_, State> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock GPIO port that records pin activity.
///
/// # Examples
///
/// ```
/// use readerlink_hardware::mock::MockGpio;
/// use readerlink_hardware::traits::GpioPort;
///
/// #[tokio::main]
/// async fn main() {
///     let (gpio, handle) = MockGpio::new();
///     let mut changes = gpio.take_changes().unwrap();
///
///     handle.set_input(15, true);
///     let change = changes.recv().await.unwrap();
///     assert_eq!((change.pin, change.level), (15, true));
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockGpio {
    shared: Shared,
}

impl MockGpio {
    pub fn new() -> (Self, MockGpioHandle) {
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(State {
            changes_rx: Some(changes_rx),
            ..State::default()
        }));

        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockGpioHandle { shared, changes_tx },
        )
    }
}

impl Default for MockGpio {
    fn default() -> Self {
        Self::new().0
    }
}

impl GpioPort for MockGpio {
    async fn setup(&self, pin: u8, direction: PinDirection, edge: Option<Edge>) -> Result<()> {
        lock(&self.shared).setups.push(PinSetup {
            pin,
            direction,
            edge,
        });
        Ok(())
    }

    async fn write(&self, pin: u8, level: bool) -> Result<()> {
        let mut state = lock(&self.shared);
        if state.fail_writes {
            return Err(DriverError::gpio(format!("write to pin {pin} failed")));
        }
        state.writes.push((pin, level));
        Ok(())
    }

    fn take_changes(&self) -> Option<mpsc::UnboundedReceiver<PinChange>> {
        lock(&self.shared).changes_rx.take()
    }

    async fn destroy(&self) -> Result<()> {
        lock(&self.shared).destroys += 1;
        Ok(())
    }
}

/// Handle for driving and inspecting a [`MockGpio`].
#[derive(Debug, Clone)]
pub struct MockGpioHandle {
    shared: Shared,
    changes_tx: mpsc::UnboundedSender<PinChange>,
}

impl MockGpioHandle {
    /// Simulate a level change on an input pin.
    pub fn set_input(&self, pin: u8, level: bool) {
        // The session may already have shut down.
        let _ = self.changes_tx.send(PinChange { pin, level });
    }

    /// Make every subsequent `write` fail.
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.shared).fail_writes = fail;
    }

    pub fn setups(&self) -> Vec<PinSetup> {
        lock(&self.shared).setups.clone()
    }

    /// Every successful write, oldest first.
    pub fn writes(&self) -> Vec<(u8, bool)> {
        lock(&self.shared).writes.clone()
    }

    /// Last level written to `pin`.
    pub fn level(&self, pin: u8) -> Option<bool> {
        lock(&self.shared)
            .writes
            .iter()
            .rev()
            .find(|(p, _)| *p == pin)
            .map(|(_, level)| *level)
    }

    pub fn destroys(&self) -> usize {
        lock(&self.shared).destroys
    }
}
