//! JSON-lines framing for stdin commands and stdout results.

use readerlink_core::Message;
use readerlink_session::Status;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;

/// One line written to stdout.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Line<'a> {
    Accepted { operation: String },
    Rejected { reason: String, message: &'a Message },
    Message { message: &'a Message },
    Status { status: &'a Status },
    Error { error: String },
}

impl Line<'_> {
    pub fn emit(&self) -> anyhow::Result<()> {
        let text = serde_json::to_string(self)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{text}")?;
        stdout.flush()?;
        Ok(())
    }
}

/// Parse one input line into a message.
///
/// A JSON object is a full message, any other JSON value is a bare payload
/// and text that is not JSON at all is taken as a string payload. Blank
/// lines yield `None`.
pub fn parse_line(line: &str) -> Option<Message> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let message = match serde_json::from_str::<Value>(line) {
        Ok(value @ Value::Object(_)) => {
            serde_json::from_value(value.clone()).unwrap_or_else(|_| Message::new(value))
        }
        Ok(value) => Message::new(value),
        Err(_) => Message::new(line),
    };
    Some(message)
}
