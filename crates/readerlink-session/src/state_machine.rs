//! Reader session state machine.
//!
//! The lifecycle is an explicit state/event table. [`transition`] is a pure
//! function from `(state, event)` to the next state and the list of
//! [`Effect`]s the session actor must carry out; it performs no I/O. The
//! [`StateMachine`] wrapper applies transitions and keeps a bounded history.
//!
//! # States
//!
//! - `Uninitialized`: created, no init attempted yet
//! - `Initializing`: init sequence running
//! - `Connected`: idle, health probe active
//! - `TaskInFlight`: the exclusive slot is held by a command
//! - `Error`: a fault is being classified
//! - `Disconnected`: torn down, reconnect timer armed
//!
//! # Valid Transitions
//!
//! - Uninitialized/Disconnected → Initializing (`Init`)
//! - Initializing → Connected (`Ready`)
//! - Connected → TaskInFlight (`Task`) → Connected (`TaskDone`)
//! - Connected/TaskInFlight self-loops on `Probe`, `Tick` and `Task(stop)`
//! - Initializing/Connected/TaskInFlight → Error (`Fault`)
//! - Error → Disconnected (`Escalate`) or Connected (`Recover`)
//!
//! # Examples
//!
//! ```
//! use readerlink_session::state_machine::{Event, SessionState, StateMachine};
//!
//! let mut machine = StateMachine::new();
//! machine.handle(Event::Init { configured: true }).unwrap();
//! machine.handle(Event::Ready).unwrap();
//! assert_eq!(machine.current_state(), SessionState::Connected);
//!
//! // Ready is meaningless once connected
//! assert!(machine.handle(Event::Ready).is_err());
//! assert_eq!(machine.history().len(), 2);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use readerlink_core::{Error, Operation, Result, TaskKind, Temperature};

use crate::classifier::{ErrorVerdict, FaultCause, classify};
use crate::status::Status;

/// Maximum number of state transitions kept in history.
const MAX_HISTORY_SIZE: usize = 100;

/// Lifecycle state of a reader session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Connected,
    TaskInFlight,
    Error,
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            SessionState::Uninitialized => "Uninitialized",
            SessionState::Initializing => "Initializing",
            SessionState::Connected => "Connected",
            SessionState::TaskInFlight => "TaskInFlight",
            SessionState::Error => "Error",
            SessionState::Disconnected => "Disconnected",
        };
        write!(f, "{}", state_str)
    }
}

impl SessionState {
    /// Whether commands may be submitted in this state.
    pub fn accepts_commands(&self) -> bool {
        matches!(self, SessionState::Connected | SessionState::TaskInFlight)
    }
}

/// The nine events that drive the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Start (or restart) the init sequence.
    Init { configured: bool },

    /// Driver initialized and the first temperature probe succeeded.
    Ready,

    /// A command took the exclusive slot (or `stop` joined a running one).
    Task(Operation),

    /// The command holding the slot completed successfully.
    TaskDone,

    /// Health probe reading while idle.
    Probe(Temperature),

    /// Temperature reading from a continuous-read tick.
    Tick(Temperature),

    Fault(FaultCause),

    /// Classified fatal: tear down and reconnect.
    Escalate(ErrorVerdict),

    /// Classified non-fatal: resume as connected.
    Recover(ErrorVerdict),
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Init { .. } => "init",
            Event::Ready => "ready",
            Event::Task(_) => "task",
            Event::TaskDone => "task_done",
            Event::Probe(_) => "probe",
            Event::Tick(_) => "tick",
            Event::Fault(_) => "fault",
            Event::Escalate(_) => "escalate",
            Event::Recover(_) => "recover",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Side effects requested by a transition, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Push a status to every command issuer.
    Publish(Status),
    SetConnected(bool),
    SetOperation(Option<Operation>),
    BeginInit,
    StartHealthProbe,
    CancelHealthProbe,
    CancelContinuousRead,
    CancelReconnect,
    CancelAllTimers,
    ReleaseSlot,
    /// Best-effort device release; `reset_device` also power-cycles the
    /// reader.
    Teardown { reset_device: bool },
    ScheduleReconnect,
    /// Feed another event into the machine after this transition's effects.
    Raise(Event),
}

/// Compute the transition for `event` in `state`.
///
/// # Errors
///
/// Returns [`Error::InvalidStateTransition`] when `event` has no meaning in
/// `state`. The session ignores such events (they come from completions
/// that raced with a state change).
pub fn transition(state: SessionState, event: Event) -> Result<(SessionState, Vec<Effect>)> {
    let outcome = match (state, event) {
        (
            SessionState::Uninitialized | SessionState::Disconnected,
            Event::Init { configured },
        ) => {
            let mut effects = vec![
                Effect::CancelReconnect,
                Effect::SetConnected(false),
                Effect::Publish(Status::connecting()),
            ];
            effects.push(if configured {
                Effect::BeginInit
            } else {
                Effect::Raise(Event::Fault(FaultCause::Misconfigured))
            });
            (SessionState::Initializing, effects)
        }

        (SessionState::Initializing, Event::Ready) => (
            SessionState::Connected,
            vec![
                Effect::SetConnected(true),
                Effect::Publish(Status::connected(None)),
                Effect::StartHealthProbe,
            ],
        ),

        (SessionState::Connected, Event::Task(operation)) => (
            SessionState::TaskInFlight,
            vec![
                Effect::CancelHealthProbe,
                Effect::SetOperation(Some(operation)),
                Effect::Publish(Status::task(operation, None)),
            ],
        ),

        (
            SessionState::TaskInFlight,
            Event::Task(operation @ Operation::Task(TaskKind::Stop)),
        ) => (
            SessionState::TaskInFlight,
            vec![
                Effect::CancelContinuousRead,
                Effect::SetOperation(Some(operation)),
                Effect::Publish(Status::task(operation, None)),
            ],
        ),

        (SessionState::TaskInFlight, Event::TaskDone) => (
            SessionState::Connected,
            vec![
                Effect::ReleaseSlot,
                Effect::SetOperation(None),
                Effect::Publish(Status::connected(None)),
                Effect::StartHealthProbe,
            ],
        ),

        (SessionState::Connected, Event::Probe(temperature)) if temperature.is_timeout() => (
            SessionState::Connected,
            vec![
                Effect::CancelHealthProbe,
                Effect::Raise(Event::Fault(FaultCause::ConnectionTimeout)),
            ],
        ),

        (SessionState::Connected, Event::Probe(temperature)) => (
            SessionState::Connected,
            vec![Effect::Publish(Status::connected(Some(temperature)))],
        ),

        (SessionState::TaskInFlight, Event::Tick(temperature)) if temperature.is_timeout() => (
            SessionState::TaskInFlight,
            vec![
                Effect::CancelContinuousRead,
                Effect::Raise(Event::Fault(FaultCause::ConnectionTimeout)),
            ],
        ),

        (SessionState::TaskInFlight, Event::Tick(temperature)) => (
            SessionState::TaskInFlight,
            vec![Effect::Publish(Status::task(
                Operation::ContinuousRead,
                Some(temperature),
            ))],
        ),

        (
            from @ (SessionState::Initializing
            | SessionState::Connected
            | SessionState::TaskInFlight),
            Event::Fault(cause),
        ) => {
            let mut verdict = classify(&cause);
            if from == SessionState::Initializing {
                verdict = verdict.escalate();
            }
            let follow_up = if verdict.fatal {
                Event::Escalate(verdict.clone())
            } else {
                Event::Recover(verdict.clone())
            };
            (
                SessionState::Error,
                vec![
                    Effect::CancelAllTimers,
                    Effect::ReleaseSlot,
                    Effect::Publish(Status::error(&verdict.message)),
                    Effect::Raise(follow_up),
                ],
            )
        }

        (SessionState::Error, Event::Escalate(verdict)) => (
            SessionState::Disconnected,
            vec![
                Effect::Teardown {
                    reset_device: verdict.reset_device,
                },
                Effect::SetOperation(None),
                Effect::SetConnected(false),
                Effect::Publish(Status::disconnected()),
                Effect::ScheduleReconnect,
            ],
        ),

        (SessionState::Error, Event::Recover(_)) => (
            SessionState::Connected,
            vec![
                Effect::SetOperation(None),
                Effect::Publish(Status::connected(None)),
                Effect::StartHealthProbe,
            ],
        ),

        (from, event) => {
            return Err(Error::InvalidStateTransition {
                from: from.to_string(),
                event: event.to_string(),
            });
        }
    };

    Ok(outcome)
}

/// A recorded state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: SessionState,

    pub to: SessionState,

    /// Name of the event that caused the transition.
    pub event: String,

    /// When the transition occurred.
    ///
    /// Not serialized; deserialization stamps the current time.
    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: SessionState, to: SessionState, event: &Event) -> Self {
        Self {
            from,
            to,
            event: event.to_string(),
            timestamp: Instant::now(),
        }
    }
}

/// Session state holder with transition history.
#[derive(Debug)]
pub struct StateMachine {
    current_state: SessionState,

    /// History of state transitions (limited to MAX_HISTORY_SIZE).
    history: VecDeque<StateTransition>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current_state: SessionState::Uninitialized,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current_state(&self) -> SessionState {
        self.current_state
    }

    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Apply `event`, returning the effects to execute.
    ///
    /// Self-loops (probe readings, ticks, a joining `stop`) are applied but
    /// not recorded in history.
    ///
    /// # Errors
    ///
    /// Returns an error (and leaves the state untouched) if the event is not
    /// valid in the current state.
    pub fn handle(&mut self, event: Event) -> Result<Vec<Effect>> {
        let from = self.current_state;
        let record = StateTransition::new(from, from, &event);
        let (to, effects) = transition(from, event)?;

        if to != from {
            self.current_state = to;
            self.add_to_history(StateTransition { to, ..record });
        }

        Ok(effects)
    }

    fn add_to_history(&mut self, transition: StateTransition) {
        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
