//! Reader session actor and its public handle.
//!
//! A session is a single tokio task that owns every piece of session state.
//! [`SessionHandle`] methods, driver completions, timers and GPIO changes all
//! reach it as messages, so state is never mutated concurrently.
//!
//! ```text
//!  SessionHandle ──┐
//!  init task ──────┤                ┌──► issuers (status + messages)
//!  driver tasks ───┼──► Session ────┼──► GPIO listeners
//!  timers ─────────┤    (actor)     └──► ReaderDriver / GpioPort
//!  pin changes ────┘
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use readerlink_core::{Message, Region};
//! use readerlink_hardware::mock::MockReader;
//! use readerlink_session::{ReaderConfig, Role, SessionBuilder, SessionState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (reader, _handle) = MockReader::new();
//!     let config = ReaderConfig::new("/dev/ttyUSB0", Some(Region::EU));
//!     let session = SessionBuilder::new(config, reader).spawn();
//!
//!     // The first command issuer starts the init sequence
//!     let mut issuer = session.register(Role::CommandIssuer).await?;
//!     session.wait_for_state(SessionState::Connected).await?;
//!
//!     session.submit(issuer.id, Message::new("read")).await?;
//!     let reply = issuer.messages.recv().await;
//!     println!("{reply:?}");
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

use crate::classifier::FaultCause;
use crate::config::ReaderConfig;
use crate::dispatcher::{InFlight, NOT_AVAILABLE, TaskOutput};
use crate::error::{Accepted, RejectReason, Rejection, SessionError};
use crate::gpio_bridge::{Debouncer, parse_output_level};
use crate::registry::{Registry, Role, SubscriberId, Subscription};
use crate::slot::ExclusiveSlot;
use crate::state_machine::{Effect, Event, SessionState, StateMachine, StateTransition};
use crate::status::Status;
use crate::timers::{Mailbox, SessionTimers, post};
use readerlink_core::constants::TOPIC_GPIO_INPUT;
use readerlink_core::{Message, Operation, Temperature};
use readerlink_hardware::{
    AnyGpio, BufferedRead, DriverError, Edge, GpioPort, InitParams, PinChange, PinDirection,
    ReaderDriver,
};
use std::collections::{HashMap, VecDeque};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};

/// Messages processed by the session actor.
#[derive(Debug)]
pub(crate) enum SessionMsg {
    Register {
        role: Role,
        reply: oneshot::Sender<Subscription>,
    },
    Deregister {
        id: SubscriberId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Submit {
        issuer: SubscriberId,
        message: Message,
        reply: oneshot::Sender<Result<Accepted, Rejection>>,
    },
    WriteOutput {
        message: Message,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    History {
        reply: oneshot::Sender<Vec<StateTransition>>,
    },
    Close {
        ack: oneshot::Sender<()>,
    },
    InitFinished {
        ticket: u64,
        opened: bool,
        result: Result<(), FaultCause>,
    },
    TaskFinished {
        ticket: u64,
        outcome: Result<TaskOutput, DriverError>,
    },
    HealthProbe {
        epoch: u64,
        reading: Result<Temperature, DriverError>,
    },
    ReadTick {
        epoch: u64,
        reading: Result<BufferedRead, DriverError>,
    },
    ReconnectDue {
        epoch: u64,
    },
}

/// State owned by the actor task.
pub(crate) struct Session<D, G> {
    pub(crate) config: ReaderConfig,
    pub(crate) driver: Arc<D>,
    gpio: Option<Arc<G>>,
    pub(crate) machine: StateMachine,
    state_tx: watch::Sender<SessionState>,
    pub(crate) registry: Registry,
    pub(crate) slot: ExclusiveSlot,
    pub(crate) timers: SessionTimers,
    pub(crate) mailbox: Mailbox,

    /// Label of the operation holding the slot.
    operation: Option<Operation>,
    connected: bool,
    driver_open: bool,
    pub(crate) continuous_read: bool,
    pub(crate) stop_pending: bool,

    /// The command whose completion drives the state machine.
    pub(crate) task: Option<InFlight>,
    /// Commands still outstanding when a fault released the slot; their
    /// replies are still delivered when they complete.
    pub(crate) detached: HashMap<u64, InFlight>,
    pub(crate) next_ticket: u64,
    init_ticket: u64,

    debouncer: Debouncer,
    input_ready: bool,
    output_ready: bool,

    /// Last status published to command issuers.
    issuer_status: Status,
    closed: bool,
}

impl<D: ReaderDriver, G: GpioPort> Session<D, G> {
    async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<SessionMsg>,
        mut changes: Option<mpsc::UnboundedReceiver<PinChange>>,
    ) {
        tracing::debug!(port = %self.config.port, gpio = self.gpio.is_some(), "session started");

        loop {
            tokio::select! {
                msg = inbox.recv() => {
                    let Some(msg) = msg else {
                        self.shutdown().await;
                        break;
                    };
                    if self.handle(msg).await.is_break() {
                        break;
                    }
                }
                change = next_change(&mut changes) => match change {
                    Some(change) => self.on_pin_change(change),
                    None => changes = None,
                },
            }
        }
    }

    async fn handle(&mut self, msg: SessionMsg) -> ControlFlow<()> {
        match msg {
            SessionMsg::Register { role, reply } => {
                let subscription = self.register(role).await;
                let _ = reply.send(subscription);
            }
            SessionMsg::Deregister { id, reply } => {
                let _ = reply.send(self.deregister(id));
            }
            SessionMsg::Submit {
                issuer,
                message,
                reply,
            } => {
                let outcome = self.submit(issuer, message).await;
                let _ = reply.send(outcome);
            }
            SessionMsg::WriteOutput { message, reply } => {
                let _ = reply.send(self.write_output(message).await);
            }
            SessionMsg::History { reply } => {
                let _ = reply.send(self.machine.history().iter().cloned().collect());
            }
            SessionMsg::InitFinished {
                ticket,
                opened,
                result,
            } => self.on_init_finished(ticket, opened, result).await,
            SessionMsg::TaskFinished { ticket, outcome } => {
                self.on_task_finished(ticket, outcome).await;
            }
            SessionMsg::HealthProbe { epoch, reading } => {
                if !self.timers.health.is_current(epoch) {
                    tracing::debug!(epoch, "stale health probe ignored");
                    return ControlFlow::Continue(());
                }
                let event = match reading {
                    Ok(temperature) => Event::Probe(temperature),
                    Err(err) => Event::Fault(FaultCause::Driver(err)),
                };
                self.fire(event).await;
            }
            SessionMsg::ReadTick { epoch, reading } => self.on_read_tick(epoch, reading).await,
            SessionMsg::ReconnectDue { epoch } => {
                if !self.timers.reconnect.is_current(epoch) {
                    tracing::debug!(epoch, "stale reconnect ignored");
                    return ControlFlow::Continue(());
                }
                tracing::info!(port = %self.config.port, "reconnecting");
                let configured = self.config.is_configured();
                self.fire(Event::Init { configured }).await;
            }
            SessionMsg::Close { ack } => {
                self.shutdown().await;
                let _ = ack.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Feed an event, and every event it raises, through the state machine.
    pub(crate) async fn fire(&mut self, event: Event) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            match &event {
                Event::Escalate(verdict) => tracing::error!(
                    message = %verdict.message,
                    reset_device = verdict.reset_device,
                    "fatal reader error"
                ),
                Event::Recover(verdict) => {
                    tracing::warn!(message = %verdict.message, "reader warning");
                }
                _ => {}
            }

            let from = self.machine.current_state();
            let name = event.to_string();
            let effects = match self.machine.handle(event) {
                Ok(effects) => effects,
                Err(err) => {
                    tracing::debug!(error = %err, "event ignored");
                    continue;
                }
            };

            for effect in effects {
                if let Some(raised) = self.apply(effect).await {
                    queue.push_back(raised);
                }
            }

            let to = self.machine.current_state();
            if to != from {
                self.state_tx.send_replace(to);
                tracing::info!(%from, %to, event = %name, "state entered");
            }
        }
    }

    async fn apply(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::Publish(status) => self.publish(status),
            Effect::SetConnected(connected) => self.connected = connected,
            Effect::SetOperation(operation) => self.operation = operation,
            Effect::BeginInit => return self.begin_init(),
            Effect::StartHealthProbe => {
                let every = self.config.timings.health_probe();
                self.timers
                    .start_health_probe(Arc::clone(&self.driver), every, self.mailbox.clone());
            }
            Effect::CancelHealthProbe => {
                self.timers.health.cancel();
            }
            Effect::CancelContinuousRead => {
                self.timers.read_tick.cancel();
            }
            Effect::CancelReconnect => {
                self.timers.reconnect.cancel();
            }
            Effect::CancelAllTimers => self.timers.cancel_all(),
            Effect::ReleaseSlot => self.release_slot(),
            Effect::Teardown { reset_device } => self.teardown(reset_device).await,
            Effect::ScheduleReconnect => {
                let delay = self.config.timings.reconnect_delay();
                self.timers.schedule_reconnect(delay, self.mailbox.clone());
            }
            Effect::Raise(event) => return Some(event),
        }
        None
    }

    fn publish(&mut self, status: Status) {
        tracing::trace!(%status, "status");
        self.registry.set_status(Role::CommandIssuer, &status);
        self.issuer_status = status;
    }

    fn release_slot(&mut self) {
        self.slot.release();
        self.stop_pending = false;
        if let Some(task) = self.task.take() {
            tracing::debug!(ticket = task.ticket, "slot released with a task outstanding");
            self.detached.insert(task.ticket, task);
        }
    }

    /// Spawn the init sequence. Raises a fault right away when there is
    /// nothing to connect to.
    fn begin_init(&mut self) -> Option<Event> {
        let Some(params) = self.config.init_params() else {
            return Some(Event::Fault(FaultCause::Misconfigured));
        };

        self.init_ticket += 1;
        let ticket = self.init_ticket;
        let driver = Arc::clone(&self.driver);
        let gpio = self.gpio.clone();
        let settle = self.config.timings.init_settle();
        let power_pin = self.config.pins.reader_power;
        let mailbox = self.mailbox.clone();

        tokio::spawn(async move {
            time::sleep(settle).await;
            if let Some(gpio) = gpio {
                power_reader(&*gpio, power_pin).await;
            }

            let (opened, result) = initialize(&*driver, params).await;
            let msg = SessionMsg::InitFinished {
                ticket,
                opened,
                result,
            };
            // Nobody is left to release the transport
            if !post(&mailbox, msg)
                && opened
                && let Err(err) = driver.destroy().await
            {
                tracing::warn!(error = %err, "failed to release reader after close");
            }
        });

        None
    }

    async fn on_init_finished(
        &mut self,
        ticket: u64,
        opened: bool,
        result: Result<(), FaultCause>,
    ) {
        self.driver_open |= opened;
        if ticket != self.init_ticket {
            tracing::debug!(ticket, "stale init completion ignored");
            return;
        }

        let event = match result {
            Ok(()) => Event::Ready,
            Err(cause) => Event::Fault(cause),
        };
        self.fire(event).await;
    }

    async fn teardown(&mut self, reset_device: bool) {
        self.release_driver().await;

        if reset_device && let Some(gpio) = &self.gpio {
            let pin = self.config.pins.reader_power;
            if let Err(err) = gpio.write(pin, false).await {
                tracing::warn!(pin, error = %err, "failed to power down reader");
            }
        }
    }

    /// Stop an active continuous read and release the transport, swallowing
    /// failures.
    async fn release_driver(&mut self) {
        if self.continuous_read {
            self.continuous_read = false;
            if let Err(err) = self.driver.stop_read().await {
                tracing::warn!(error = %err, "failed to stop continuous read");
            }
        }

        if self.driver_open {
            self.driver_open = false;
            if let Err(err) = self.driver.destroy().await {
                tracing::warn!(error = %err, "failed to release reader");
            }
        }
    }

    async fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.timers.shutdown();
        self.release_driver().await;
        if let Some(gpio) = &self.gpio
            && let Err(err) = gpio.destroy().await
        {
            tracing::warn!(error = %err, "failed to release gpio");
        }

        tracing::info!(
            port = %self.config.port,
            connected = self.connected,
            operation = ?self.operation,
            "session closed"
        );
    }

    async fn register(&mut self, role: Role) -> Subscription {
        let initial = match role {
            Role::CommandIssuer => self.issuer_status.clone(),
            Role::GpioInput | Role::GpioOutput if self.gpio.is_some() => Status::gpio_ready(),
            Role::GpioInput | Role::GpioOutput => Status::no_gpio(),
        };
        let subscription = self.registry.register(role, initial);
        tracing::debug!(
            id = %subscription.id,
            ?role,
            count = self.registry.count(role),
            "subscriber registered"
        );

        match role {
            Role::CommandIssuer if self.machine.current_state() == SessionState::Uninitialized => {
                let configured = self.config.is_configured();
                self.fire(Event::Init { configured }).await;
            }
            Role::GpioInput if !self.input_ready => self.setup_input().await,
            Role::GpioOutput if !self.output_ready => {
                if let Err(err) = self.setup_output().await {
                    tracing::warn!(error = %err, "gpio output setup failed");
                }
            }
            _ => {}
        }

        subscription
    }

    fn deregister(&mut self, id: SubscriberId) -> Result<(), SessionError> {
        let role = self
            .registry
            .deregister(id)
            .ok_or(SessionError::UnknownSubscriber(id))?;
        tracing::debug!(%id, ?role, "subscriber deregistered");
        Ok(())
    }

    async fn setup_input(&mut self) {
        let Some(gpio) = &self.gpio else {
            return;
        };
        let pin = self.config.pins.input;
        match gpio.setup(pin, PinDirection::Input, Some(Edge::Both)).await {
            Ok(()) => self.input_ready = true,
            Err(err) => tracing::warn!(pin, error = %err, "gpio input setup failed"),
        }
    }

    async fn setup_output(&mut self) -> Result<(), SessionError> {
        let Some(gpio) = &self.gpio else {
            return Err(SessionError::GpioUnavailable);
        };
        gpio.setup(self.config.pins.output, PinDirection::Output, None)
            .await?;
        self.output_ready = true;
        Ok(())
    }

    async fn write_output(&mut self, message: Message) -> Result<(), SessionError> {
        let Some(gpio) = self.gpio.clone() else {
            return Err(SessionError::GpioUnavailable);
        };
        let level = parse_output_level(&message)?;
        if !self.output_ready {
            self.setup_output().await?;
        }

        let pin = self.config.pins.output;
        gpio.write(pin, level).await?;

        let value = u8::from(level);
        tracing::debug!(pin, value, "gpio output written");
        self.registry
            .set_status(Role::GpioOutput, &Status::gpio_value(value));
        Ok(())
    }

    fn on_pin_change(&mut self, change: PinChange) {
        if !self.input_ready {
            return;
        }
        let Some(value) = self.debouncer.accept(change, Instant::now()) else {
            return;
        };

        tracing::debug!(pin = change.pin, value, "gpio input changed");
        let message = Message::new(value).with_topic(TOPIC_GPIO_INPUT);
        self.registry.broadcast(Role::GpioInput, &message);
        self.registry
            .set_status(Role::GpioInput, &Status::gpio_value(value));
    }
}

async fn next_change(changes: &mut Option<mpsc::UnboundedReceiver<PinChange>>) -> Option<PinChange> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Switch on the reader module. Failures are logged only.
async fn power_reader<G: GpioPort>(gpio: &G, pin: u8) {
    let outcome = match gpio.setup(pin, PinDirection::Output, None).await {
        Ok(()) => gpio.write(pin, true).await,
        Err(err) => Err(err),
    };
    if let Err(err) = outcome {
        tracing::warn!(pin, error = %err, "failed to power up reader");
    }
}

/// Open the driver and check that the reader answers.
///
/// Returns whether the transport was opened alongside the result.
async fn initialize<D: ReaderDriver>(
    driver: &D,
    params: InitParams,
) -> (bool, Result<(), FaultCause>) {
    if let Err(err) = driver.init(params).await {
        return (false, Err(FaultCause::Init(err)));
    }

    let result = match driver.read_temperature().await {
        Ok(temperature) if temperature.is_timeout() => Err(FaultCause::ConnectionTimeout),
        Ok(_) => Ok(()),
        Err(err) => Err(FaultCause::Driver(err)),
    };
    (true, result)
}

/// Builds and spawns a session.
///
/// GPIO is optional; without [`with_gpio`](Self::with_gpio) the session runs
/// as on a board without GPIO.
pub struct SessionBuilder<D, G = AnyGpio> {
    config: ReaderConfig,
    driver: D,
    gpio: Option<G>,
}

impl<D: ReaderDriver> SessionBuilder<D, AnyGpio> {
    pub fn new(config: ReaderConfig, driver: D) -> Self {
        Self {
            config,
            driver,
            gpio: None,
        }
    }
}

impl<D: ReaderDriver, G: GpioPort> SessionBuilder<D, G> {
    pub fn with_gpio<P: GpioPort>(self, gpio: P) -> SessionBuilder<D, P> {
        SessionBuilder {
            config: self.config,
            driver: self.driver,
            gpio: Some(gpio),
        }
    }

    /// Spawn the actor onto the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(self) -> SessionHandle {
        let (tx, inbox) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Uninitialized);
        let slot = ExclusiveSlot::new();
        let changes = self.gpio.as_ref().and_then(|gpio| gpio.take_changes());
        let debouncer = Debouncer::new(self.config.pins.input, self.config.timings.debounce());

        let session = Session {
            config: self.config,
            driver: Arc::new(self.driver),
            gpio: self.gpio.map(Arc::new),
            machine: StateMachine::new(),
            state_tx,
            registry: Registry::default(),
            slot: slot.clone(),
            timers: SessionTimers::new(),
            mailbox: tx.downgrade(),
            operation: None,
            connected: false,
            driver_open: false,
            continuous_read: false,
            stop_pending: false,
            task: None,
            detached: HashMap::new(),
            next_ticket: 0,
            init_ticket: 0,
            debouncer,
            input_ready: false,
            output_ready: false,
            issuer_status: Status::disconnected(),
            closed: false,
        };
        tokio::spawn(session.run(inbox, changes));

        SessionHandle {
            tx,
            state: state_rx,
            slot,
        }
    }
}

/// Cloneable handle to a running session.
///
/// The session stops when [`close`](Self::close) is called or when every
/// handle has been dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionMsg>,
    state: watch::Receiver<SessionState>,
    slot: ExclusiveSlot,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionMsg,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Register a subscriber.
    ///
    /// The first command issuer registered on a fresh session starts the
    /// init sequence. The first GPIO input or output listener configures
    /// its pin.
    pub async fn register(&self, role: Role) -> Result<Subscription, SessionError> {
        self.request(|reply| SessionMsg::Register { role, reply })
            .await
    }

    pub async fn deregister(&self, id: SubscriberId) -> Result<(), SessionError> {
        self.request(|reply| SessionMsg::Deregister { id, reply })
            .await?
    }

    /// Submit a command on behalf of a registered command issuer.
    ///
    /// Resolves once the session has decided whether to run the command. The
    /// result of an accepted command arrives on the issuer's message stream.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] carrying the failure message for the issuer
    /// when the reader is not available, the issuer is unknown, the payload
    /// does not name a task, or the reader is busy.
    pub async fn submit(
        &self,
        issuer: SubscriberId,
        message: Message,
    ) -> Result<Accepted, Rejection> {
        let fallback = message.clone();
        match self
            .request(|reply| SessionMsg::Submit {
                issuer,
                message,
                reply,
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(Rejection::new(
                RejectReason::NotAvailable,
                fallback.into_failure(NOT_AVAILABLE),
            )),
        }
    }

    /// Drive the GPIO output pin. The payload must be 0 or 1.
    ///
    /// # Errors
    ///
    /// - [`SessionError::GpioUnavailable`] without GPIO
    /// - [`SessionError::InvalidLevel`] for any other payload
    /// - [`SessionError::Gpio`] if the pin write failed
    pub async fn write_output(&self, message: Message) -> Result<(), SessionError> {
        self.request(|reply| SessionMsg::WriteOutput { message, reply })
            .await?
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait until the session enters `target`.
    pub async fn wait_for_state(&self, target: SessionState) -> Result<(), SessionError> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| SessionError::Closed)
    }

    /// Whether a command holds the exclusive slot.
    pub fn is_busy(&self) -> bool {
        self.slot.is_busy()
    }

    /// Recorded state transitions, oldest first.
    pub async fn history(&self) -> Result<Vec<StateTransition>, SessionError> {
        self.request(|reply| SessionMsg::History { reply }).await
    }

    /// Close the session: cancel timers, stop an active continuous read and
    /// release the driver and GPIO.
    ///
    /// Idempotent; closing a closed session is a no-op.
    pub async fn close(&self) {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(SessionMsg::Close { ack }).is_ok() {
            // A dropped ack means another close got there first.
            let _ = rx.await;
        }
    }
}
