//! Subscriber registry.
//!
//! The session holds only the sending halves of each subscriber's status and
//! message channels. A subscriber that drops its [`Subscription`] is pruned
//! the next time the registry touches it.

use crate::status::Status;
use readerlink_core::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// What a subscriber registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Submits commands and receives results and reader status.
    CommandIssuer,
    /// Receives debounced GPIO input changes.
    GpioInput,
    /// Drives the GPIO output pin.
    GpioOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The receiving side of a registration.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub role: Role,
    pub status: watch::Receiver<Status>,
    pub messages: mpsc::UnboundedReceiver<Message>,
}

#[derive(Debug)]
struct Entry {
    id: SubscriberId,
    role: Role,
    status: watch::Sender<Status>,
    messages: mpsc::UnboundedSender<Message>,
}

impl Entry {
    fn is_gone(&self) -> bool {
        self.messages.is_closed()
    }
}

/// Registered subscribers, in registration order.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    pub(crate) fn register(&mut self, role: Role, initial: Status) -> Subscription {
        self.prune();

        let id = SubscriberId::new();
        let (status_tx, status_rx) = watch::channel(initial);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        self.entries.push(Entry {
            id,
            role,
            status: status_tx,
            messages: message_tx,
        });

        Subscription {
            id,
            role,
            status: status_rx,
            messages: message_rx,
        }
    }

    /// Remove a subscriber, returning its role.
    pub(crate) fn deregister(&mut self, id: SubscriberId) -> Option<Role> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(index).role)
    }

    pub(crate) fn role_of(&self, id: SubscriberId) -> Option<Role> {
        self.entries
            .iter()
            .find(|entry| entry.id == id && !entry.is_gone())
            .map(|entry| entry.role)
    }

    pub(crate) fn count(&self, role: Role) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.role == role && !entry.is_gone())
            .count()
    }

    /// Push `status` to every subscriber of `role`.
    pub(crate) fn set_status(&mut self, role: Role, status: &Status) {
        self.prune();
        for entry in self.entries.iter().filter(|entry| entry.role == role) {
            entry.status.send_replace(status.clone());
        }
    }

    /// Deliver a message to one subscriber. Returns `false` if it is gone.
    pub(crate) fn send(&mut self, id: SubscriberId, message: Message) -> bool {
        let delivered = self
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .is_some_and(|entry| entry.messages.send(message).is_ok());
        if !delivered {
            self.prune();
        }
        delivered
    }

    /// Deliver a message to every subscriber of `role`.
    pub(crate) fn broadcast(&mut self, role: Role, message: &Message) {
        self.prune();
        for entry in self.entries.iter().filter(|entry| entry.role == role) {
            // A receiver dropped since the prune is removed next time.
            let _ = entry.messages.send(message.clone());
        }
    }

    fn prune(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|entry| !entry.is_gone());
        let pruned = before - self.entries.len();
        if pruned > 0 {
            tracing::debug!(pruned, "dropped closed subscribers");
        }
    }
}
