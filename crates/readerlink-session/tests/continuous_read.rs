//! Integration tests for continuous read: the tag stream, stop and tick
//! failures.

mod common;

use common::{Harness, connected, next_message, settle, wait_for, wait_for_status};
use readerlink_core::{Message, Operation, TagRecord, Temperature};
use readerlink_hardware::DriverError;
use readerlink_hardware::mock::DriverOp;
use readerlink_session::{RejectReason, Role, SessionState};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

async fn reading(tags: &[&str]) -> Harness {
    let harness = connected().await;
    harness
        .reader
        .set_buffered_tags(tags.iter().map(|epc| TagRecord::new(*epc)).collect());
    harness.reader.set_temperature(Temperature::celsius(23));

    let accepted = harness
        .session
        .submit(harness.issuer.id, Message::new("start"))
        .await
        .unwrap();
    assert_eq!(accepted.operation, Operation::ContinuousRead);
    harness
}

/// Collect the messages of one tick: one per tag followed by the temperature.
async fn tick(harness: &mut Harness, tags: usize) -> Vec<Message> {
    let mut messages = Vec::with_capacity(tags + 1);
    for _ in 0..=tags {
        messages.push(next_message(&mut harness.issuer).await);
    }
    messages
}

#[tokio::test(start_paused = true)]
async fn test_each_tick_emits_tags_then_temperature() {
    let mut harness = reading(&["E2001", "E2002"]).await;
    let started = Instant::now();

    for round in 1..=3u32 {
        let messages = tick(&mut harness, 2).await;

        assert_eq!(messages[0].topic.as_deref(), Some("rfid"));
        assert_eq!(messages[0].payload_str(), Some("continuous read"));
        assert_eq!(messages[0].epc.as_deref(), Some("E2001"));
        assert_eq!(messages[1].epc.as_deref(), Some("E2002"));
        assert_eq!(messages[2].topic.as_deref(), Some("temp"));
        assert_eq!(messages[2].payload, json!(23));

        assert_eq!(
            Instant::now() - started,
            Duration::from_millis(500) * round
        );
    }

    assert_eq!(harness.session.state(), SessionState::TaskInFlight);
    assert!(harness.session.is_busy());
    assert_eq!(harness.reader.calls(DriverOp::DrainBuffer), 3);
    wait_for_status(&mut harness.issuer, |status| {
        status.text == "task continuous read 23°C"
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_the_stream() {
    let mut harness = reading(&["E2001", "E2002"]).await;
    tick(&mut harness, 2).await;

    let rejection = harness
        .session
        .submit(harness.issuer.id, Message::new("read"))
        .await
        .unwrap_err();
    assert_eq!(rejection.reason, RejectReason::Busy);

    harness
        .session
        .submit(harness.issuer.id, Message::new("stop"))
        .await
        .unwrap();

    loop {
        let message = next_message(&mut harness.issuer).await;
        if message.payload_str() == Some("stop") {
            break;
        }
        assert!(message.topic.is_some(), "unexpected message {message:?}");
    }

    wait_for(&harness.session, SessionState::Connected).await;
    assert!(!harness.session.is_busy());
    assert_eq!(harness.reader.calls(DriverOp::StopRead), 1);

    let drains = harness.reader.calls(DriverOp::DrainBuffer);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(harness.reader.calls(DriverOp::DrainBuffer), drains);
    assert!(harness.issuer.messages.try_recv().is_err());

    // Nothing left to stop on close
    harness.session.close().await;
    assert_eq!(harness.reader.calls(DriverOp::StopRead), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_stop_while_pending_is_busy() {
    let mut harness = reading(&["E2001"]).await;
    harness
        .reader
        .set_latency(DriverOp::StopRead, Duration::from_secs(1));
    tick(&mut harness, 1).await;

    harness
        .session
        .submit(harness.issuer.id, Message::new("stop"))
        .await
        .unwrap();
    let rejection = harness
        .session
        .submit(harness.issuer.id, Message::new("stop"))
        .await
        .unwrap_err();
    assert_eq!(rejection.reason, RejectReason::Busy);
    assert_eq!(
        rejection.message.payload_str(),
        Some("stop failed: reader busy")
    );

    let reply = next_message(&mut harness.issuer).await;
    assert_eq!(reply.payload_str(), Some("stop"));
    wait_for(&harness.session, SessionState::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn test_every_issuer_receives_the_stream() {
    let mut harness = reading(&["E2001"]).await;
    let mut other = harness
        .session
        .register(Role::CommandIssuer)
        .await
        .unwrap();

    tick(&mut harness, 1).await;
    let tag = next_message(&mut other).await;
    assert_eq!(tag.epc.as_deref(), Some("E2001"));
    let temperature = next_message(&mut other).await;
    assert_eq!(temperature.topic.as_deref(), Some("temp"));
}

#[tokio::test(start_paused = true)]
async fn test_drain_failure_is_fatal() {
    let mut harness = reading(&["E2001"]).await;
    harness
        .reader
        .fail_next(DriverOp::DrainBuffer, DriverError::tag("buffer overflow"));

    wait_for(&harness.session, SessionState::Disconnected).await;
    assert_eq!(harness.reader.calls(DriverOp::StopRead), 1);
    assert_eq!(harness.reader.calls(DriverOp::Destroy), 1);
    assert!(!harness.session.is_busy());
    assert!(harness.issuer.messages.try_recv().is_err());

    wait_for(&harness.session, SessionState::Connected).await;
    settle().await;
    assert_eq!(harness.reader.calls(DriverOp::DrainBuffer), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_temperature_is_published_then_fatal() {
    let mut harness = reading(&["E2001"]).await;
    harness.reader.push_temperature(Temperature::TIMEOUT);

    let tag = next_message(&mut harness.issuer).await;
    assert_eq!(tag.epc.as_deref(), Some("E2001"));

    let reading = next_message(&mut harness.issuer).await;
    assert_eq!(reading.topic.as_deref(), Some("temp"));
    assert_eq!(reading.payload, json!(-100));

    wait_for(&harness.session, SessionState::Disconnected).await;
    assert!(harness.issuer.messages.try_recv().is_err());
    assert_eq!(harness.reader.calls(DriverOp::StopRead), 1);
}
