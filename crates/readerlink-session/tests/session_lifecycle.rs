//! Integration tests for the session lifecycle: init, health probing,
//! fatal errors, reconnect and close.

mod common;

use common::{connected, entries, next_message, settle, start, wait_for, wait_for_status};
use readerlink_core::{Message, Region, Temperature};
use readerlink_hardware::DriverError;
use readerlink_hardware::mock::DriverOp;
use readerlink_session::{
    ReaderConfig, RejectReason, Role, SessionError, SessionState, Status,
};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_first_issuer_connects() {
    let mut harness = connected().await;

    assert_eq!(harness.reader.calls(DriverOp::Init), 1);
    assert!(harness.reader.is_open());

    let params = harness.reader.last_init().unwrap();
    assert_eq!(params.port, common::PORT);
    assert_eq!(params.region, Region::EU);
    assert_eq!(params.power, 2000);
    assert_eq!(params.timeout, Duration::from_secs(2));

    wait_for_status(&mut harness.issuer, |status| status.text.starts_with("connected")).await;

    let history = harness.session.history().await.unwrap();
    let path: Vec<_> = history.iter().map(|t| (t.from, t.to)).collect();
    assert_eq!(
        path,
        vec![
            (SessionState::Uninitialized, SessionState::Initializing),
            (SessionState::Initializing, SessionState::Connected),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_second_issuer_sees_current_status() {
    let harness = connected().await;

    let late = harness.session.register(Role::CommandIssuer).await.unwrap();
    assert_eq!(*late.status.borrow(), *harness.issuer.status.borrow());
    assert!(late.status.borrow().text.starts_with("connected"));
    assert_eq!(harness.reader.calls(DriverOp::Init), 1);
}

#[tokio::test(start_paused = true)]
async fn test_health_probe_publishes_temperature() {
    let mut harness = connected().await;
    harness.reader.set_temperature(Temperature::celsius(31));

    wait_for_status(&mut harness.issuer, |status| {
        status.text == "connected 31°C"
    })
    .await;
    assert_eq!(harness.session.state(), SessionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_probe_timeout_disconnects_and_reconnects_once() {
    let harness = connected().await;
    let connected_at = Instant::now();
    harness.reader.push_temperature(Temperature::TIMEOUT);

    wait_for(&harness.session, SessionState::Disconnected).await;
    let disconnected_at = Instant::now();
    assert!(disconnected_at - connected_at <= Duration::from_secs(3));
    assert_eq!(harness.reader.calls(DriverOp::Destroy), 1);
    assert!(!harness.reader.is_open());
    assert_eq!(*harness.issuer.status.borrow(), Status::disconnected());

    wait_for(&harness.session, SessionState::Connected).await;
    assert!(Instant::now() - disconnected_at >= Duration::from_secs(3));
    assert_eq!(harness.reader.calls(DriverOp::Init), 2);
    assert_eq!(entries(&harness.session, SessionState::Initializing).await, 2);
    assert_eq!(entries(&harness.session, SessionState::Disconnected).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_probe_driver_error_is_fatal_for_link_failures() {
    let harness = connected().await;
    harness
        .reader
        .fail_next(DriverOp::Temperature, DriverError::communication("link lost"));

    wait_for(&harness.session, SessionState::Disconnected).await;
    wait_for(&harness.session, SessionState::Connected).await;
    assert_eq!(harness.reader.calls(DriverOp::Init), 2);
}

#[tokio::test(start_paused = true)]
async fn test_misconfigured_session_never_opens_driver() {
    let mut harness = start(ReaderConfig::new(common::PORT, None)).await;

    wait_for(&harness.session, SessionState::Disconnected).await;
    assert_eq!(harness.reader.calls(DriverOp::Init), 0);
    assert_eq!(harness.reader.calls(DriverOp::Destroy), 0);

    // The reconnect timer keeps retrying and keeps failing
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(harness.session.state(), SessionState::Disconnected);
    assert_eq!(entries(&harness.session, SessionState::Initializing).await, 2);
    assert_eq!(harness.reader.calls(DriverOp::Init), 0);

    let rejection = harness
        .session
        .submit(harness.issuer.id, Message::new("read"))
        .await
        .unwrap_err();
    assert_eq!(rejection.reason, RejectReason::NotAvailable);
    assert!(harness.issuer.messages.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_init_failure_escalates_then_recovers() {
    let (reader, handle) = readerlink_hardware::mock::MockReader::new();
    handle.fail_next(
        DriverOp::Init,
        DriverError::initialization_failed("region rejected"),
    );
    let harness = common::start_with(common::config(), reader, handle).await;

    wait_for(&harness.session, SessionState::Disconnected).await;
    assert!(!harness.reader.is_open());
    // Never opened, so nothing to release
    assert_eq!(harness.reader.calls(DriverOp::Destroy), 0);

    wait_for(&harness.session, SessionState::Connected).await;
    assert_eq!(harness.reader.calls(DriverOp::Init), 2);
}

#[tokio::test(start_paused = true)]
async fn test_first_probe_timeout_releases_opened_driver() {
    let (reader, handle) = readerlink_hardware::mock::MockReader::new();
    handle.push_temperature(Temperature::TIMEOUT);
    let harness = common::start_with(common::config(), reader, handle).await;

    wait_for(&harness.session, SessionState::Disconnected).await;
    assert_eq!(harness.reader.calls(DriverOp::Init), 1);
    assert_eq!(harness.reader.calls(DriverOp::Destroy), 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_fatal_failure_stays_connected() {
    let mut harness = connected().await;
    harness
        .reader
        .fail_next(DriverOp::ReadTag, DriverError::tag("no tag found"));

    harness
        .session
        .submit(harness.issuer.id, Message::new("read"))
        .await
        .unwrap();

    let reply = next_message(&mut harness.issuer).await;
    assert_eq!(reply.payload_str(), Some("read failed: no tag found"));

    wait_for(&harness.session, SessionState::Connected).await;
    assert!(!harness.session.is_busy());
    assert_eq!(harness.reader.calls(DriverOp::Destroy), 0);
    assert_eq!(entries(&harness.session, SessionState::Error).await, 1);
    assert_eq!(entries(&harness.session, SessionState::Disconnected).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_task_failure_reconnects() {
    let mut harness = connected().await;
    harness
        .reader
        .fail_next(DriverOp::ReadTag, DriverError::communication("CRC error"));

    harness
        .session
        .submit(harness.issuer.id, Message::new("read"))
        .await
        .unwrap();

    let reply = next_message(&mut harness.issuer).await;
    assert_eq!(reply.payload_str(), Some("read failed: CRC error"));

    wait_for(&harness.session, SessionState::Disconnected).await;
    assert!(!harness.session.is_busy());
    wait_for(&harness.session, SessionState::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent() {
    let mut harness = connected().await;

    harness
        .session
        .submit(harness.issuer.id, Message::new("start"))
        .await
        .unwrap();
    next_message(&mut harness.issuer).await;

    harness.session.close().await;
    harness.session.close().await;
    settle().await;

    assert_eq!(harness.reader.calls(DriverOp::StopRead), 1);
    assert_eq!(harness.reader.calls(DriverOp::Destroy), 1);
    assert!(!harness.reader.is_open());

    let drains = harness.reader.calls(DriverOp::DrainBuffer);
    let probes = harness.reader.calls(DriverOp::Temperature);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.reader.calls(DriverOp::DrainBuffer), drains);
    assert_eq!(harness.reader.calls(DriverOp::Temperature), probes);
    assert_eq!(harness.reader.calls(DriverOp::Init), 1);

    let rejection = harness
        .session
        .submit(harness.issuer.id, Message::new("read"))
        .await
        .unwrap_err();
    assert_eq!(rejection.reason, RejectReason::NotAvailable);
    assert_eq!(
        rejection.message.payload_str(),
        Some("read failed: reader not available")
    );

    let err = harness
        .session
        .register(Role::CommandIssuer)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Closed));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_every_handle_releases_driver() {
    let harness = connected().await;
    let reader = harness.reader.clone();
    drop(harness);

    settle().await;
    assert_eq!(reader.calls(DriverOp::Destroy), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deregister() {
    let harness = connected().await;
    let id = harness.issuer.id;

    harness.session.deregister(id).await.unwrap();
    let err = harness.session.deregister(id).await.unwrap_err();
    assert!(matches!(err, SessionError::UnknownSubscriber(_)));

    let rejection = harness
        .session
        .submit(id, Message::new("read"))
        .await
        .unwrap_err();
    assert_eq!(rejection.reason, RejectReason::UnknownIssuer);
}

#[tokio::test(start_paused = true)]
async fn test_close_during_init_releases_opened_driver() {
    let harness = start(common::config()).await;
    harness
        .reader
        .fail_next(DriverOp::Destroy, DriverError::communication("port busy"));

    // Still inside the settle delay, before the driver opened
    harness.session.close().await;
    assert_eq!(harness.reader.calls(DriverOp::Destroy), 0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.reader.calls(DriverOp::Init), 1);
    assert_eq!(harness.reader.calls(DriverOp::Destroy), 1);
    assert!(!harness.reader.is_open());
}
