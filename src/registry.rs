//! Active-transaction registry.
//!
//! Process-wide map from [`ContextId`] to the root transaction currently
//! active in that context. The registry never owns a transaction: each slot
//! holds a [`WeakTransaction`] plus a generation counter, so an entry stops
//! resolving the moment the owner drops its last strong handle, and a scope
//! guard can release its own registration without clobbering a newer one.
//!
//! The slot map is the only structure in this crate shared across execution
//! contexts; every operation takes the one internal lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::context::ContextId;
use crate::transaction::{Transaction, WeakTransaction};

struct Slot {
    generation: u64,
    transaction: WeakTransaction,
}

/// Registry of active root transactions, keyed by execution context.
pub struct Registry {
    slots: Mutex<HashMap<ContextId, Slot>>,
    next_generation: AtomicU64,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Returns the root transaction registered for `context`.
    ///
    /// Returns `None` when no entry exists or when the registered
    /// transaction has been discarded by its owner; a dead entry is removed
    /// on the way out.
    #[must_use]
    pub fn get_current(&self, context: ContextId) -> Option<Transaction> {
        let mut slots = self.slots.lock();
        let slot = slots.get(&context)?;
        match slot.transaction.upgrade() {
            Some(transaction) => Some(transaction),
            None => {
                slots.remove(&context);
                None
            }
        }
    }

    /// Registers `transaction` as the root for `context`.
    ///
    /// Called only by a root transaction's `enter`. Overwrites any existing
    /// entry for the context (last writer wins, no warning) and returns the
    /// generation the caller's matching release must present. Entries whose
    /// transaction is already dead are pruned while the lock is held.
    pub(crate) fn set_current(&self, context: ContextId, transaction: &Transaction) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut slots = self.slots.lock();
        slots.retain(|_, slot| slot.transaction.is_alive());
        slots.insert(
            context,
            Slot {
                generation,
                transaction: transaction.downgrade(),
            },
        );
        generation
    }

    /// Releases the registration for `context` if `generation` still holds.
    ///
    /// A stale generation means the slot was re-registered by a newer root;
    /// the newer entry is left in place. Returns `true` when the slot was
    /// cleared.
    pub(crate) fn clear_if_current(&self, context: ContextId, generation: u64) -> bool {
        let mut slots = self.slots.lock();
        match slots.get(&context) {
            Some(slot) if slot.generation == generation => {
                slots.remove(&context);
                true
            }
            _ => false,
        }
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let slots = self.slots.lock();
        slots
            .values()
            .filter(|slot| slot.transaction.is_alive())
            .count()
    }

    /// Returns `true` when no live entry exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
