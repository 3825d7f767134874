//! Shared helpers for session integration tests.
//!
//! Every test runs on a paused tokio clock, so timer intervals are the real
//! defaults (3 s probe, 500 ms tick, 3 s reconnect) and cost nothing.
//! Receives are wrapped in a generous timeout: on a paused clock a missing
//! message would otherwise auto-advance forever.

#![allow(dead_code)]

use readerlink_core::{Message, Region};
use readerlink_hardware::mock::{MockGpio, MockGpioHandle, MockReader, MockReaderHandle};
use readerlink_session::{
    ReaderConfig, Role, SessionBuilder, SessionHandle, SessionState, Status, Subscription,
};
use std::time::Duration;
use tokio::time::timeout;

pub const PORT: &str = "/dev/ttyUSB0";

/// Upper bound for any single wait.
pub const WAIT: Duration = Duration::from_secs(60);

pub fn config() -> ReaderConfig {
    ReaderConfig::new(PORT, Some(Region::EU))
}

/// A running session with one registered command issuer.
pub struct Harness {
    pub session: SessionHandle,
    pub reader: MockReaderHandle,
    pub issuer: Subscription,
}

/// Spawn a session with `config` and register an issuer, without waiting
/// for the init sequence.
pub async fn start(config: ReaderConfig) -> Harness {
    let (reader, handle) = MockReader::new();
    start_with(config, reader, handle).await
}

pub async fn start_with(
    config: ReaderConfig,
    reader: MockReader,
    handle: MockReaderHandle,
) -> Harness {
    let session = SessionBuilder::new(config, reader).spawn();
    let issuer = session.register(Role::CommandIssuer).await.unwrap();
    Harness {
        session,
        reader: handle,
        issuer,
    }
}

/// A session that reached `Connected`.
pub async fn connected() -> Harness {
    let harness = start(config()).await;
    wait_for(&harness.session, SessionState::Connected).await;
    harness
}

/// A connected session with a mock GPIO port attached.
pub async fn connected_with_gpio() -> (Harness, MockGpioHandle) {
    let (reader, reader_handle) = MockReader::new();
    let (gpio, gpio_handle) = MockGpio::new();
    let session = SessionBuilder::new(config(), reader)
        .with_gpio(gpio)
        .spawn();
    let issuer = session.register(Role::CommandIssuer).await.unwrap();
    wait_for(&session, SessionState::Connected).await;

    let harness = Harness {
        session,
        reader: reader_handle,
        issuer,
    };
    (harness, gpio_handle)
}

// ============================================================================
// Waiting
// ============================================================================

pub async fn wait_for(session: &SessionHandle, state: SessionState) {
    timeout(WAIT, session.wait_for_state(state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}"))
        .unwrap();
}

pub async fn next_message(subscription: &mut Subscription) -> Message {
    timeout(WAIT, subscription.messages.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("message stream closed")
}

/// Wait until the subscription's status satisfies `predicate`.
pub async fn wait_for_status(subscription: &mut Subscription, predicate: impl Fn(&Status) -> bool) {
    timeout(WAIT, subscription.status.wait_for(|status| predicate(status)))
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed");
}

/// Let every runnable task make progress without moving the clock much.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Number of times the session entered `state`.
pub async fn entries(session: &SessionHandle, state: SessionState) -> usize {
    session
        .history()
        .await
        .unwrap()
        .iter()
        .filter(|transition| transition.to == state)
        .count()
}
