//! Observable status tuple pushed to subscribers.

use readerlink_core::{Operation, Temperature};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fill {
    Red,
    Blue,
    Yellow,
    Grey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Dot,
    Ring,
}

/// A (fill, shape, text) status indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub fill: Fill,
    pub shape: Shape,
    pub text: String,
}

impl Status {
    pub fn new(fill: Fill, shape: Shape, text: impl Into<String>) -> Self {
        Self {
            fill,
            shape,
            text: text.into(),
        }
    }

    pub fn connecting() -> Self {
        Self::new(Fill::Red, Shape::Ring, "connecting...")
    }

    /// Connected, optionally showing the last probed temperature.
    pub fn connected(temperature: Option<Temperature>) -> Self {
        let text = match temperature {
            Some(t) => format!("connected {t}"),
            None => "connected".to_string(),
        };
        Self::new(Fill::Blue, Shape::Dot, text)
    }

    /// Busy with `operation`, optionally showing a continuous-read
    /// temperature.
    pub fn task(operation: Operation, temperature: Option<Temperature>) -> Self {
        let text = match temperature {
            Some(t) => format!("task {operation} {t}"),
            None => format!("task {operation}"),
        };
        Self::new(Fill::Yellow, Shape::Dot, text)
    }

    pub fn error(message: &str) -> Self {
        Self::new(Fill::Red, Shape::Dot, format!("error: {message}"))
    }

    pub fn disconnected() -> Self {
        Self::new(Fill::Red, Shape::Dot, "disconnected")
    }

    /// GPIO listener status on a board with GPIO.
    pub fn gpio_ready() -> Self {
        Self::new(Fill::Blue, Shape::Dot, " ")
    }

    pub fn gpio_value(value: u8) -> Self {
        Self::new(Fill::Blue, Shape::Dot, value.to_string())
    }

    pub fn no_gpio() -> Self {
        Self::new(Fill::Grey, Shape::Dot, "no gpio found")
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{:?}/{:?}] {}", self.fill, self.shape, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readerlink_core::TaskKind;

    #[test]
    fn test_status_texts() {
        assert_eq!(Status::connecting().text, "connecting...");
        assert_eq!(Status::connecting().shape, Shape::Ring);
        assert_eq!(Status::connected(None).text, "connected");
        assert_eq!(
            Status::connected(Some(Temperature::celsius(23))).text,
            "connected 23°C"
        );
        assert_eq!(
            Status::task(TaskKind::Read.operation(), None).text,
            "task read"
        );
        assert_eq!(
            Status::task(Operation::ContinuousRead, Some(Temperature::celsius(23))).text,
            "task continuous read 23°C"
        );
        assert_eq!(Status::error("port not found").text, "error: port not found");
        assert_eq!(Status::gpio_value(1).text, "1");
    }

    #[test]
    fn test_status_colors() {
        assert_eq!(Status::connected(None).fill, Fill::Blue);
        assert_eq!(Status::task(Operation::ContinuousRead, None).fill, Fill::Yellow);
        assert_eq!(Status::error("x").fill, Fill::Red);
        assert_eq!(Status::disconnected().fill, Fill::Red);
        assert_eq!(Status::no_gpio().fill, Fill::Grey);
    }
}
