//! Boundary message schema and command parsing.
//!
//! A [`Message`] is what the orchestration layer hands to a session and what
//! the session sends back: the payload carries either a task name or result
//! text, and the optional fields carry task arguments and tag data.
//! [`Command::from_message`] turns an incoming message into a typed command.

use crate::{
    Result,
    constants::{ARGUMENT_SEPARATOR, CONTINUOUS_READ_PAYLOAD, TOPIC_TAG, TOPIC_TEMPERATURE},
    error::Error,
    types::{TagRecord, TaskKind, Temperature},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message exchanged with subscribers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Task name on the way in, result text (or a JSON value) on the way out.
    #[serde(default)]
    pub payload: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epc: Option<String>,

    /// Reserved memory bank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub res: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locks: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Firmware image path for `fwupdate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<String>,
}

impl Message {
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_epc(mut self, epc: impl Into<String>) -> Self {
        self.epc = Some(epc.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_locks(mut self, locks: impl Into<String>) -> Self {
        self.locks = Some(locks.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_res(mut self, res: impl Into<String>) -> Self {
        self.res = Some(res.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// A continuous-read tag message.
    pub fn tag(tag: &TagRecord) -> Self {
        let mut msg = Self::new(CONTINUOUS_READ_PAYLOAD).with_topic(TOPIC_TAG);
        msg.merge_tag(tag);
        msg
    }

    /// A continuous-read temperature message.
    pub fn temperature(temperature: Temperature) -> Self {
        Self::new(temperature.value()).with_topic(TOPIC_TEMPERATURE)
    }

    /// Payload as a string slice, if it is a JSON string.
    pub fn payload_str(&self) -> Option<&str> {
        self.payload.as_str()
    }

    /// Payload rendered as text: strings verbatim, anything else as JSON.
    pub fn payload_text(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Replace the payload with `"<payload> failed: <reason>"`.
    pub fn into_failure(mut self, reason: &str) -> Self {
        self.payload = Value::String(format!("{} failed: {}", self.payload_text(), reason));
        self
    }

    /// Copy the EPC and every present memory bank of `tag` into this message.
    pub fn merge_tag(&mut self, tag: &TagRecord) {
        self.epc = Some(tag.epc.clone());
        if let Some(res) = &tag.reserved {
            self.res = Some(res.clone());
        }
        if let Some(tid) = &tag.tid {
            self.tid = Some(tid.clone());
        }
        if let Some(user) = &tag.user {
            self.user = Some(user.clone());
        }
    }
}

/// A parsed command.
///
/// String fields of `write`, `lock` and `kill` are already normalized:
/// upper-cased, with missing fields defaulted to the empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Read {
        argument: Option<String>,
    },
    Write {
        filter: String,
        epc: String,
        reserved: String,
        user: String,
    },
    Start,
    Stop,
    Lock {
        filter: String,
        locks: String,
        password: String,
    },
    Kill {
        filter: String,
        password: String,
    },
    Info,
    Reboot,
    FirmwareUpdate {
        path: String,
    },
}

fn normalized(field: &Option<String>) -> String {
    field.as_deref().unwrap_or_default().to_uppercase()
}

impl Command {
    /// Parse a command out of an incoming message.
    ///
    /// The payload must be a string naming one of the nine tasks. A `read`
    /// may embed its argument as `read:<argument>`; otherwise the message's
    /// `argument` field is used.
    ///
    /// # Errors
    ///
    /// - [`Error::PayloadNotString`] when the payload is not a JSON string
    /// - [`Error::InvalidOperation`] when the task name is not recognized
    ///
    /// # Examples
    ///
    /// ```
    /// use readerlink_core::{Command, Message};
    ///
    /// let cmd = Command::from_message(&Message::new("read:2")).unwrap();
    /// assert_eq!(cmd, Command::Read { argument: Some("2".into()) });
    ///
    /// assert!(Command::from_message(&Message::new("scan")).is_err());
    /// ```
    pub fn from_message(msg: &Message) -> Result<Self> {
        let payload = msg
            .payload_str()
            .ok_or_else(|| Error::PayloadNotString(msg.payload_text()))?;

        let (name, embedded) = match payload.split_once(ARGUMENT_SEPARATOR) {
            Some((head, rest)) if head == TaskKind::Read.as_str() => (head, Some(rest.to_string())),
            _ => (payload, None),
        };

        let kind: TaskKind = name.parse()?;

        Ok(match kind {
            TaskKind::Read => Command::Read {
                argument: embedded.or_else(|| msg.argument.clone()),
            },
            TaskKind::Write => Command::Write {
                filter: normalized(&msg.filter),
                epc: normalized(&msg.epc),
                reserved: normalized(&msg.res),
                user: normalized(&msg.user),
            },
            TaskKind::Start => Command::Start,
            TaskKind::Stop => Command::Stop,
            TaskKind::Lock => Command::Lock {
                filter: normalized(&msg.filter),
                locks: normalized(&msg.locks),
                password: normalized(&msg.password),
            },
            TaskKind::Kill => Command::Kill {
                filter: normalized(&msg.filter),
                password: normalized(&msg.password),
            },
            TaskKind::Info => Command::Info,
            TaskKind::Reboot => Command::Reboot,
            TaskKind::FirmwareUpdate => Command::FirmwareUpdate {
                path: msg.path.clone().unwrap_or_default(),
            },
        })
    }

    #[must_use]
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Read { .. } => TaskKind::Read,
            Self::Write { .. } => TaskKind::Write,
            Self::Start => TaskKind::Start,
            Self::Stop => TaskKind::Stop,
            Self::Lock { .. } => TaskKind::Lock,
            Self::Kill { .. } => TaskKind::Kill,
            Self::Info => TaskKind::Info,
            Self::Reboot => TaskKind::Reboot,
            Self::FirmwareUpdate { .. } => TaskKind::FirmwareUpdate,
        }
    }

    /// Build the reply skeleton for this command from the original message.
    ///
    /// The payload becomes the bare task name (with a read argument moved
    /// into `argument`), and normalized fields replace the raw ones.
    pub fn reply_to(&self, msg: &Message) -> Message {
        let mut reply = msg.clone();
        reply.payload = Value::String(self.kind().as_str().to_string());

        match self {
            Self::Read { argument } => reply.argument = argument.clone(),
            Self::Write {
                filter,
                epc,
                reserved,
                user,
            } => {
                reply.filter = Some(filter.clone());
                reply.epc = Some(epc.clone());
                reply.res = Some(reserved.clone());
                reply.user = Some(user.clone());
            }
            Self::Lock {
                filter,
                locks,
                password,
            } => {
                reply.filter = Some(filter.clone());
                reply.locks = Some(locks.clone());
                reply.password = Some(password.clone());
            }
            Self::Kill { filter, password } => {
                reply.filter = Some(filter.clone());
                reply.password = Some(password.clone());
            }
            Self::FirmwareUpdate { path } => reply.path = Some(path.clone()),
            Self::Start | Self::Stop | Self::Info | Self::Reboot => {}
        }

        reply
    }

    /// Text used when this command is rejected as busy: `read:<argument>`
    /// for a read carrying an argument, the bare task name otherwise.
    pub fn busy_label(&self) -> String {
        match self {
            Self::Read {
                argument: Some(argument),
            } => format!("{}{}{}", TaskKind::Read, ARGUMENT_SEPARATOR, argument),
            other => other.kind().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("read", TaskKind::Read)]
    #[case("write", TaskKind::Write)]
    #[case("start", TaskKind::Start)]
    #[case("stop", TaskKind::Stop)]
    #[case("lock", TaskKind::Lock)]
    #[case("kill", TaskKind::Kill)]
    #[case("info", TaskKind::Info)]
    #[case("reboot", TaskKind::Reboot)]
    #[case("fwupdate", TaskKind::FirmwareUpdate)]
    fn test_parse_task_names(#[case] payload: &str, #[case] expected: TaskKind) {
        let cmd = Command::from_message(&Message::new(payload)).unwrap();
        assert_eq!(cmd.kind(), expected);
    }

    #[test]
    fn test_read_embedded_argument() {
        let cmd = Command::from_message(&Message::new("read:antenna2")).unwrap();
        assert_eq!(
            cmd,
            Command::Read {
                argument: Some("antenna2".to_string())
            }
        );
        assert_eq!(cmd.busy_label(), "read:antenna2");
    }

    #[test]
    fn test_read_without_argument() {
        let cmd = Command::from_message(&Message::new("read")).unwrap();
        assert_eq!(cmd, Command::Read { argument: None });
        assert_eq!(cmd.busy_label(), "read");
    }

    #[test]
    fn test_read_argument_field_fallback() {
        let mut msg = Message::new("read");
        msg.argument = Some("1".to_string());
        let cmd = Command::from_message(&msg).unwrap();
        assert_eq!(
            cmd,
            Command::Read {
                argument: Some("1".to_string())
            }
        );
    }

    #[rstest]
    #[case("scan")]
    #[case("Read")]
    #[case("readall")]
    #[case("start:fast")]
    #[case("")]
    fn test_invalid_operation(#[case] payload: &str) {
        let err = Command::from_message(&Message::new(payload)).unwrap_err();
        assert_eq!(err.to_string(), format!("Invalid operation: {payload}"));
    }

    #[test]
    fn test_non_string_payload() {
        let err = Command::from_message(&Message::new(json!(42))).unwrap_err();
        assert!(matches!(err, Error::PayloadNotString(_)));
        assert_eq!(err.to_string(), "msg.payload isn't a string: 42");
    }

    #[test]
    fn test_write_fields_normalized() {
        let msg = Message::new("write")
            .with_filter("e200")
            .with_epc("abcd")
            .with_user("cafe");
        let cmd = Command::from_message(&msg).unwrap();

        assert_eq!(
            cmd,
            Command::Write {
                filter: "E200".to_string(),
                epc: "ABCD".to_string(),
                reserved: String::new(),
                user: "CAFE".to_string(),
            }
        );

        let reply = cmd.reply_to(&msg);
        assert_eq!(reply.epc.as_deref(), Some("ABCD"));
        assert_eq!(reply.res.as_deref(), Some(""));
        assert_eq!(reply.payload, json!("write"));
    }

    #[test]
    fn test_kill_and_lock_normalized() {
        let kill = Command::from_message(&Message::new("kill").with_password("deadbeef")).unwrap();
        assert_eq!(
            kill,
            Command::Kill {
                filter: String::new(),
                password: "DEADBEEF".to_string(),
            }
        );

        let lock = Command::from_message(
            &Message::new("lock")
                .with_filter("e2")
                .with_locks("epc_lock")
                .with_password("00ff"),
        )
        .unwrap();
        assert_eq!(
            lock,
            Command::Lock {
                filter: "E2".to_string(),
                locks: "EPC_LOCK".to_string(),
                password: "00FF".to_string(),
            }
        );
    }

    #[test]
    fn test_fwupdate_path_defaults_empty() {
        let cmd = Command::from_message(&Message::new("fwupdate")).unwrap();
        assert_eq!(
            cmd,
            Command::FirmwareUpdate {
                path: String::new()
            }
        );
    }

    #[test]
    fn test_failure_text() {
        let msg = Message::new("info").into_failure("reader not available");
        assert_eq!(msg.payload, json!("info failed: reader not available"));
    }

    #[test]
    fn test_tag_message_shape() {
        let tag = TagRecord::new("E2001234").with_tid("E280");
        let msg = Message::tag(&tag);

        assert_eq!(msg.topic.as_deref(), Some("rfid"));
        assert_eq!(msg.payload, json!("continuous read"));
        assert_eq!(msg.epc.as_deref(), Some("E2001234"));
        assert_eq!(msg.tid.as_deref(), Some("E280"));
        assert_eq!(msg.res, None);
    }

    #[test]
    fn test_serialization_skips_absent_fields() {
        let json = serde_json::to_value(Message::temperature(Temperature::celsius(23))).unwrap();
        assert_eq!(json, json!({ "topic": "temp", "payload": 23 }));
    }

    #[test]
    fn test_deserialize_partial_message() {
        let msg: Message = serde_json::from_str(r#"{"payload":"write","epc":"aa"}"#).unwrap();
        assert_eq!(msg.payload_str(), Some("write"));
        assert_eq!(msg.epc.as_deref(), Some("aa"));
        assert_eq!(msg.topic, None);
    }
}
