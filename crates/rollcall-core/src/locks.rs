//! Per-event write serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::types::EventId;

/// One async mutex per event, created on first use.
///
/// Every write touching an event's attendance or status holds its guard, so
/// writers for one event run one at a time while different events proceed in
/// parallel. Readers never take it.
#[derive(Clone, Default)]
pub struct EventLocks {
    slots: Arc<Mutex<HashMap<EventId, Arc<AsyncMutex<()>>>>>,
}

impl EventLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, event: EventId) -> OwnedMutexGuard<()> {
        let slot = {
            // The map only holds lock handles; a poisoned guard is still usable.
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(event).or_default())
        };
        slot.lock_owned().await
    }

    /// Drop the slot of a deleted event.
    pub fn forget(&self, event: EventId) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&event);
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
