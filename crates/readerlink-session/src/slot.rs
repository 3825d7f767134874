//! Exclusive execution slot.
//!
//! The slot admits at most one reader operation at a time. Acquisition never
//! waits: a caller that loses the race is rejected immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Non-blocking binary lock shared between the session actor and its
/// handles (which only observe it).
#[derive(Debug, Clone, Default)]
pub struct ExclusiveSlot {
    busy: Arc<AtomicBool>,
}

impl ExclusiveSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot. Returns `false` if it is already held.
    pub fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Free the slot. Releasing a free slot is a no-op.
    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}
