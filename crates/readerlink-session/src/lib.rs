//! RFID reader session.
//!
//! A session owns one reader: it connects through a
//! [`ReaderDriver`](readerlink_hardware::ReaderDriver), keeps the link alive
//! with a periodic health probe, runs one command at a time for its
//! subscribers, streams tags during a continuous read and reconnects after
//! fatal errors. An optional [`GpioPort`](readerlink_hardware::GpioPort)
//! adds a debounced input and a binary output.
//!
//! The lifecycle is an explicit table in [`state_machine`]; the actor in
//! [`session`] executes its effects. See [`SessionBuilder`] to get started.

pub mod classifier;
pub mod config;
mod dispatcher;
pub mod error;
pub mod gpio_bridge;
pub mod registry;
pub mod session;
pub mod slot;
pub mod state_machine;
pub mod status;
mod timers;

pub use classifier::{ErrorVerdict, FaultCause, classify};
pub use config::{GpioPins, ReaderConfig, SessionTimings};
pub use error::{Accepted, RejectReason, Rejection, SessionError};
pub use registry::{Role, SubscriberId, Subscription};
pub use session::{SessionBuilder, SessionHandle};
pub use slot::ExclusiveSlot;
pub use state_machine::{Effect, Event, SessionState, StateMachine, StateTransition};
pub use status::{Fill, Shape, Status};
