//! Health probe, continuous-read tick and reconnect timers.
//!
//! Each timer is a spawned task guarded by its own child
//! [`CancellationToken`] and tagged with an epoch. Timer tasks never touch
//! session state: they post readings back to the actor, which drops any
//! reading whose epoch is no longer current.

use crate::session::SessionMsg;
use readerlink_hardware::ReaderDriver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Actor mailbox as seen by spawned tasks.
///
/// Weak, so that outstanding timers do not keep a dropped session alive.
pub(crate) type Mailbox = mpsc::WeakUnboundedSender<SessionMsg>;

/// Post to the actor. Returns `false` once the actor is gone.
pub(crate) fn post(mailbox: &Mailbox, msg: SessionMsg) -> bool {
    mailbox.upgrade().is_some_and(|tx| tx.send(msg).is_ok())
}

/// One cancellable timer with an epoch counter.
#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
    token: Option<CancellationToken>,
    epoch: u64,
}

impl TimerSlot {
    /// Cancel any running instance and hand out a fresh token and epoch.
    pub(crate) fn arm(&mut self, parent: &CancellationToken) -> (CancellationToken, u64) {
        self.cancel();
        self.epoch += 1;
        let token = parent.child_token();
        self.token = Some(token.clone());
        (token, self.epoch)
    }

    /// Returns whether a running instance was cancelled.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.token.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.token.is_some() && self.epoch == epoch
    }
}

/// The three session timers under one root token.
#[derive(Debug)]
pub(crate) struct SessionTimers {
    root: CancellationToken,
    pub(crate) health: TimerSlot,
    pub(crate) read_tick: TimerSlot,
    pub(crate) reconnect: TimerSlot,
}

impl SessionTimers {
    pub(crate) fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            health: TimerSlot::default(),
            read_tick: TimerSlot::default(),
            reconnect: TimerSlot::default(),
        }
    }

    pub(crate) fn cancel_all(&mut self) {
        let health = self.health.cancel();
        let read_tick = self.read_tick.cancel();
        let reconnect = self.reconnect.cancel();
        if health || read_tick || reconnect {
            tracing::debug!(health, read_tick, reconnect, "timers cancelled");
        }
    }

    /// Cancel everything, including timers armed later from the same root.
    pub(crate) fn shutdown(&mut self) {
        self.cancel_all();
        self.root.cancel();
    }

    /// Probe the reader temperature every `every` while idle.
    pub(crate) fn start_health_probe<D: ReaderDriver>(
        &mut self,
        driver: Arc<D>,
        every: Duration,
        mailbox: Mailbox,
    ) {
        let (token, epoch) = self.health.arm(&self.root);

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let reading = driver.read_temperature().await;
                        if token.is_cancelled()
                            || !post(&mailbox, SessionMsg::HealthProbe { epoch, reading })
                        {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Drain buffered tags every `every` during a continuous read.
    pub(crate) fn start_read_tick<D: ReaderDriver>(
        &mut self,
        driver: Arc<D>,
        every: Duration,
        mailbox: Mailbox,
    ) {
        let (token, epoch) = self.read_tick.arm(&self.root);

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let reading = driver.drain_buffer().await;
                        if token.is_cancelled()
                            || !post(&mailbox, SessionMsg::ReadTick { epoch, reading })
                        {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Post a single reconnect request after `delay`.
    pub(crate) fn schedule_reconnect(&mut self, delay: Duration, mailbox: Mailbox) {
        let (token, epoch) = self.reconnect.arm(&self.root);

        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = time::sleep(delay) => {
                    post(&mailbox, SessionMsg::ReconnectDue { epoch });
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readerlink_core::Temperature;
    use readerlink_hardware::mock::{DriverOp, MockReader};

    #[test]
    fn test_arm_bumps_epoch_and_cancels_previous() {
        let root = CancellationToken::new();
        let mut slot = TimerSlot::default();

        let (first, first_epoch) = slot.arm(&root);
        let (second, second_epoch) = slot.arm(&root);

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(!slot.is_current(first_epoch));
        assert!(slot.is_current(second_epoch));
    }

    #[test]
    fn test_cancel_clears_current() {
        let root = CancellationToken::new();
        let mut slot = TimerSlot::default();
        let (token, epoch) = slot.arm(&root);

        assert!(slot.cancel());
        assert!(token.is_cancelled());
        assert!(!slot.is_current(epoch));
        assert!(!slot.cancel());
    }

    #[test]
    fn test_shutdown_cancels_children() {
        let mut timers = SessionTimers::new();
        let (token, _) = timers.health.arm(&timers.root);
        timers.shutdown();
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_probe_posts_every_interval() {
        let (reader, handle) = MockReader::new();
        handle.push_temperature(Temperature::celsius(30));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = SessionTimers::new();

        timers.start_health_probe(Arc::new(reader), Duration::from_secs(3), tx.downgrade());

        match rx.recv().await {
            Some(SessionMsg::HealthProbe { epoch, reading }) => {
                assert_eq!(epoch, 1);
                assert_eq!(reading.unwrap().value(), 30);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(matches!(
            rx.recv().await,
            Some(SessionMsg::HealthProbe { .. })
        ));
        assert_eq!(handle.calls(DriverOp::Temperature), 2);

        timers.cancel_all();
        time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.calls(DriverOp::Temperature), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_fires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = SessionTimers::new();

        timers.schedule_reconnect(Duration::from_secs(3), tx.downgrade());

        assert!(matches!(
            rx.recv().await,
            Some(SessionMsg::ReconnectDue { epoch: 1 })
        ));
        time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_reconnect_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = SessionTimers::new();

        timers.schedule_reconnect(Duration::from_secs(3), tx.downgrade());
        timers.reconnect.cancel();

        time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }
}
