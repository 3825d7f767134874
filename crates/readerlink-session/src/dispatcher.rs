//! Command admission, execution and completion.
//!
//! There is no queue. A command either takes the exclusive slot immediately
//! or is rejected with feedback. The one exception is `stop`, which joins a
//! running continuous read to end it. A one-shot command is never joined.

use crate::classifier::{FaultCause, classify};
use crate::error::{Accepted, RejectReason, Rejection};
use crate::registry::{Role, SubscriberId};
use crate::session::{Session, SessionMsg};
use crate::state_machine::{Event, SessionState};
use crate::timers::post;
use readerlink_core::{Command, Error, Message, TagRecord, TaskKind};
use readerlink_hardware::{
    BufferedRead, DriverError, GpioPort, KillRequest, LockRequest, ReaderDriver, ReaderInfo,
    WriteRequest,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

pub(crate) const NOT_AVAILABLE: &str = "reader not available";
pub(crate) const READER_BUSY: &str = "reader busy";
const UNKNOWN_ISSUER: &str = "unknown issuer";

/// What a driver call produced.
#[derive(Debug, Clone)]
pub(crate) enum TaskOutput {
    Tag(TagRecord),
    Info(ReaderInfo),
    Firmware(String),
    Done,
}

/// A command waiting for its driver completion.
#[derive(Debug, Clone)]
pub(crate) struct InFlight {
    pub(crate) ticket: u64,
    pub(crate) issuer: SubscriberId,
    pub(crate) command: Command,
    /// Reply skeleton built from the submitted message.
    pub(crate) reply: Message,
}

impl InFlight {
    /// The message for the issuer, or `None` when the command answers with
    /// its side effects only (`start` answers with the tag stream).
    fn success(&self, output: TaskOutput) -> Option<Message> {
        let mut reply = self.reply.clone();
        match output {
            TaskOutput::Tag(tag) => reply.merge_tag(&tag),
            TaskOutput::Info(info) => {
                reply.payload = serde_json::to_value(info).unwrap_or_default();
            }
            TaskOutput::Firmware(output) => reply.payload = fwupdate_payload(&output),
            TaskOutput::Done if self.command.kind() == TaskKind::Start => return None,
            TaskOutput::Done => {}
        }
        Some(reply)
    }

    fn failure(&self, err: &DriverError) -> Message {
        let mut reply = self.reply.clone();
        if self.command.kind() == TaskKind::FirmwareUpdate {
            reply.payload = fwupdate_payload(&err.detail());
            return reply;
        }
        let verdict = classify(&FaultCause::Driver(err.clone()));
        reply.into_failure(&verdict.message)
    }
}

fn fwupdate_payload(text: &str) -> Value {
    Value::String(format!("{}: {}", TaskKind::FirmwareUpdate, text))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Take the free slot.
    Run,
    /// Join the running continuous read to cancel it.
    StopConcurrent,
    Reject(RejectReason),
}

/// Decide whether a parsed command may run.
///
/// `reading` is set while the slot is held by a continuous read; only then
/// may a single `stop` share it.
pub(crate) fn admit(
    state: SessionState,
    slot_busy: bool,
    reading: bool,
    stop_pending: bool,
    kind: TaskKind,
) -> Admission {
    if !state.accepts_commands() {
        return Admission::Reject(RejectReason::NotAvailable);
    }
    match (slot_busy, kind) {
        (false, _) => Admission::Run,
        (true, TaskKind::Stop) if reading && !stop_pending => Admission::StopConcurrent,
        (true, _) => Admission::Reject(RejectReason::Busy),
    }
}

impl<D: ReaderDriver, G: GpioPort> Session<D, G> {
    pub(crate) async fn submit(
        &mut self,
        issuer: SubscriberId,
        message: Message,
    ) -> Result<Accepted, Rejection> {
        let state = self.machine.current_state();
        if !state.accepts_commands() {
            return Err(reject(
                RejectReason::NotAvailable,
                message.into_failure(NOT_AVAILABLE),
            ));
        }
        if self.registry.role_of(issuer) != Some(Role::CommandIssuer) {
            return Err(reject(
                RejectReason::UnknownIssuer,
                message.into_failure(UNKNOWN_ISSUER),
            ));
        }

        let command = match Command::from_message(&message) {
            Ok(command) => command,
            Err(err) => {
                let reason = match err {
                    Error::PayloadNotString(_) => RejectReason::NotAString,
                    _ => RejectReason::InvalidOperation,
                };
                let reply = Message {
                    payload: Value::String(err.to_string()),
                    ..message
                };
                return Err(reject(reason, reply));
            }
        };

        let kind = command.kind();
        let accepted = Accepted {
            operation: kind.operation(),
        };

        match admit(
            state,
            self.slot.is_busy(),
            self.continuous_read,
            self.stop_pending,
            kind,
        ) {
            Admission::Reject(reason) => {
                let reply = Message {
                    payload: Value::String(command.busy_label()),
                    ..message
                };
                Err(reject(reason, reply.into_failure(READER_BUSY)))
            }
            Admission::StopConcurrent => {
                self.stop_pending = true;
                self.fire(Event::Task(accepted.operation)).await;
                self.dispatch(issuer, command, &message);
                Ok(accepted)
            }
            Admission::Run => {
                if !self.slot.try_acquire() {
                    let reply = Message {
                        payload: Value::String(command.busy_label()),
                        ..message
                    };
                    return Err(reject(RejectReason::Busy, reply.into_failure(READER_BUSY)));
                }
                if kind == TaskKind::Stop {
                    self.stop_pending = true;
                }
                self.fire(Event::Task(accepted.operation)).await;

                if kind == TaskKind::Reboot {
                    self.registry.send(issuer, command.reply_to(&message));
                    self.fire(Event::Fault(FaultCause::Reboot)).await;
                } else {
                    self.dispatch(issuer, command, &message);
                }
                Ok(accepted)
            }
        }
    }

    /// Spawn the driver call for `command`.
    fn dispatch(&mut self, issuer: SubscriberId, command: Command, message: &Message) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;

        let driver = Arc::clone(&self.driver);
        let mailbox = self.mailbox.clone();
        let call = command.clone();
        tokio::spawn(async move {
            let outcome = execute(&*driver, call).await;
            post(&mailbox, SessionMsg::TaskFinished { ticket, outcome });
        });

        tracing::debug!(ticket, task = %command.kind(), "task dispatched");
        let reply = command.reply_to(message);
        let task = InFlight {
            ticket,
            issuer,
            command,
            reply,
        };
        self.task = Some(task);
    }

    pub(crate) async fn on_task_finished(
        &mut self,
        ticket: u64,
        outcome: Result<TaskOutput, DriverError>,
    ) {
        // Outlived a fault that already released the slot; the reader it
        // talked to is gone, so only the issuer hears about it.
        if let Some(stale) = self.detached.remove(&ticket) {
            tracing::debug!(ticket, task = %stale.command.kind(), "detached task finished");
            let reply = match outcome {
                Ok(output) => stale.success(output),
                Err(err) => Some(stale.failure(&err)),
            };
            if let Some(reply) = reply {
                self.registry.send(stale.issuer, reply);
            }
            return;
        }

        let Some(task) = self.task.take_if(|task| task.ticket == ticket) else {
            tracing::debug!(ticket, "completion for unknown task ignored");
            return;
        };
        let kind = task.command.kind();

        match outcome {
            Ok(output) => {
                if let Some(reply) = task.success(output) {
                    self.registry.send(task.issuer, reply);
                }
                match kind {
                    // The reader restarts after any update attempt
                    TaskKind::FirmwareUpdate => self.fire(Event::Fault(FaultCause::Reboot)).await,
                    TaskKind::Start => self.begin_continuous_read(),
                    TaskKind::Stop => {
                        self.continuous_read = false;
                        self.fire(Event::TaskDone).await;
                    }
                    _ => self.fire(Event::TaskDone).await,
                }
            }
            Err(err) => {
                tracing::debug!(ticket, task = %kind, error = %err, "task failed");
                self.registry.send(task.issuer, task.failure(&err));
                let cause = match kind {
                    TaskKind::FirmwareUpdate => FaultCause::Reboot,
                    _ => FaultCause::Driver(err),
                };
                self.fire(Event::Fault(cause)).await;
            }
        }
    }

    /// The slot stays held until `stop`.
    fn begin_continuous_read(&mut self) {
        self.continuous_read = true;
        let every = self.config.timings.read_tick();
        self.timers
            .start_read_tick(Arc::clone(&self.driver), every, self.mailbox.clone());
    }

    pub(crate) async fn on_read_tick(
        &mut self,
        epoch: u64,
        reading: Result<BufferedRead, DriverError>,
    ) {
        if !self.timers.read_tick.is_current(epoch) {
            tracing::debug!(epoch, "stale read tick ignored");
            return;
        }

        match reading {
            Ok(BufferedRead { tags, temperature }) => {
                for tag in &tags {
                    self.registry
                        .broadcast(Role::CommandIssuer, &Message::tag(tag));
                }
                // A timeout reading is published too, then faults the session
                self.registry
                    .broadcast(Role::CommandIssuer, &Message::temperature(temperature));
                tracing::trace!(tags = tags.len(), %temperature, "read tick");
                self.fire(Event::Tick(temperature)).await;
            }
            Err(err) => {
                self.fire(Event::Fault(FaultCause::ContinuousRead(err)))
                    .await;
            }
        }
    }
}

fn reject(reason: RejectReason, message: Message) -> Rejection {
    tracing::debug!(%reason, payload = %message.payload_text(), "command rejected");
    Rejection::new(reason, message)
}

async fn execute<D: ReaderDriver>(driver: &D, command: Command) -> Result<TaskOutput, DriverError> {
    match command {
        Command::Read { argument } => driver.read_tag(argument).await.map(TaskOutput::Tag),
        Command::Write {
            filter,
            epc,
            reserved,
            user,
        } => {
            let request = WriteRequest {
                filter,
                epc,
                reserved,
                user,
            };
            driver.write_tag(request).await.map(|()| TaskOutput::Done)
        }
        Command::Lock {
            filter,
            locks,
            password,
        } => {
            let request = LockRequest {
                filter,
                locks,
                password,
            };
            driver.lock_tag(request).await.map(|()| TaskOutput::Done)
        }
        Command::Kill { filter, password } => {
            let request = KillRequest { filter, password };
            driver.kill_tag(request).await.map(|()| TaskOutput::Done)
        }
        Command::Start => driver.start_read().await.map(|()| TaskOutput::Done),
        Command::Stop => driver.stop_read().await.map(|()| TaskOutput::Done),
        Command::Info => driver.reader_info().await.map(TaskOutput::Info),
        Command::FirmwareUpdate { path } => driver
            .firmware_update(PathBuf::from(path))
            .await
            .map(TaskOutput::Firmware),
        // Never reaches the driver
        Command::Reboot => Ok(TaskOutput::Done),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readerlink_core::Region;
    use rstest::rstest;

    #[rstest]
    #[case(SessionState::Uninitialized)]
    #[case(SessionState::Initializing)]
    #[case(SessionState::Error)]
    #[case(SessionState::Disconnected)]
    fn test_unavailable_states_reject(#[case] state: SessionState) {
        for kind in TaskKind::ALL {
            assert_eq!(
                admit(state, false, false, false, kind),
                Admission::Reject(RejectReason::NotAvailable)
            );
        }
    }

    #[test]
    fn test_free_slot_runs() {
        for kind in TaskKind::ALL {
            assert_eq!(
                admit(SessionState::Connected, false, false, false, kind),
                Admission::Run
            );
        }
    }

    #[rstest]
    #[case(TaskKind::Read)]
    #[case(TaskKind::Start)]
    #[case(TaskKind::Info)]
    #[case(TaskKind::Reboot)]
    #[case(TaskKind::FirmwareUpdate)]
    fn test_busy_slot_rejects(#[case] kind: TaskKind) {
        assert_eq!(
            admit(SessionState::TaskInFlight, true, false, false, kind),
            Admission::Reject(RejectReason::Busy)
        );
    }

    #[test]
    fn test_stop_joins_continuous_read_once() {
        assert_eq!(
            admit(SessionState::TaskInFlight, true, true, false, TaskKind::Stop),
            Admission::StopConcurrent
        );
        assert_eq!(
            admit(SessionState::TaskInFlight, true, true, true, TaskKind::Stop),
            Admission::Reject(RejectReason::Busy)
        );
    }

    #[test]
    fn test_stop_never_joins_one_shot_task() {
        assert_eq!(
            admit(SessionState::TaskInFlight, true, false, false, TaskKind::Stop),
            Admission::Reject(RejectReason::Busy)
        );
    }

    fn in_flight(payload: &str) -> InFlight {
        let message = Message::new(payload);
        let command = Command::from_message(&message).unwrap();
        InFlight {
            ticket: 1,
            issuer: SubscriberId::new(),
            reply: command.reply_to(&message),
            command,
        }
    }

    #[test]
    fn test_read_success_merges_tag() {
        let task = in_flight("read:1");
        let tag = TagRecord::new("E200").with_tid("E280");

        let reply = task.success(TaskOutput::Tag(tag)).unwrap();
        assert_eq!(reply.payload_str(), Some("read"));
        assert_eq!(reply.argument.as_deref(), Some("1"));
        assert_eq!(reply.epc.as_deref(), Some("E200"));
        assert_eq!(reply.tid.as_deref(), Some("E280"));
    }

    #[test]
    fn test_read_failure_uses_bare_task_name() {
        let task = in_flight("read:1");
        let reply = task.failure(&DriverError::tag("no tag found"));
        assert_eq!(reply.payload_str(), Some("read failed: no tag found"));
        assert_eq!(reply.argument.as_deref(), Some("1"));
    }

    #[test]
    fn test_failure_uses_classified_message() {
        let task = in_flight("info");
        let reply = task.failure(&DriverError::timeout(2000));
        assert_eq!(reply.payload_str(), Some("info failed: connection timeout"));
    }

    #[test]
    fn test_start_has_no_reply() {
        assert!(in_flight("start").success(TaskOutput::Done).is_none());
        assert_eq!(
            in_flight("stop")
                .success(TaskOutput::Done)
                .unwrap()
                .payload_str(),
            Some("stop")
        );
    }

    #[test]
    fn test_info_payload_is_descriptor() {
        let info = ReaderInfo::new("M6E Nano").with_region(Region::EU);
        let reply = in_flight("info").success(TaskOutput::Info(info)).unwrap();
        assert_eq!(reply.payload["model"], "M6E Nano");
    }

    #[test]
    fn test_fwupdate_payloads() {
        let task = in_flight("fwupdate");
        let ok = task
            .success(TaskOutput::Firmware("flashed".to_string()))
            .unwrap();
        assert_eq!(ok.payload_str(), Some("fwupdate: flashed"));

        let failed = task.failure(&DriverError::other("bad image"));
        assert_eq!(failed.payload_str(), Some("fwupdate: bad image"));
    }
}
