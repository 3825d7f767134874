//! Mock capability implementations for testing and development.
//!
//! These simulate a reader and a GPIO port entirely in memory and can be
//! scripted programmatically through their handles.

pub mod gpio;
pub mod reader;

pub use gpio::{MockGpio, MockGpioHandle, PinSetup};
pub use reader::{DriverOp, MockReader, MockReaderHandle};
