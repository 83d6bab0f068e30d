//! Callback registry.
//!
//! Ordered listeners per observable. Invocation is driven by
//! [`Session::invoke_callbacks`](super::Session::invoke_callbacks), which
//! iterates a [`snapshot`](CallbackRegistry::snapshot) so that callbacks may
//! register further callbacks while a pass is running.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::{FxHashMap, FxHashSet};

use crate::identifiers::{CallbackId, ObservableId};
use crate::script::FunctionRef;

// ============================================================================
// CallbackEntry
// ============================================================================

/// A registered callback.
#[derive(Clone)]
pub struct CallbackEntry {
    /// Identity used for removal.
    pub id: CallbackId,
    /// The listener.
    pub function: FunctionRef,
}

impl std::fmt::Debug for CallbackEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackEntry")
            .field("id", &self.id)
            .field("source", &self.function.source())
            .finish()
    }
}

// ============================================================================
// CallbackRegistry
// ============================================================================

/// Observable id to ordered listener list mapping.
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    callbacks: FxHashMap<ObservableId, Vec<CallbackEntry>>,
    next_id: u64,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `function` to the listeners of `id`.
    pub fn register(&mut self, id: ObservableId, function: FunctionRef) -> CallbackId {
        let callback_id = CallbackId::new(self.next_id);
        self.next_id += 1;

        self.callbacks.entry(id).or_default().push(CallbackEntry {
            id: callback_id,
            function,
        });
        callback_id
    }

    /// Returns the listeners of `id` in registration order.
    #[must_use]
    pub fn snapshot(&self, id: &ObservableId) -> Vec<CallbackEntry> {
        self.callbacks.get(id).cloned().unwrap_or_default()
    }

    /// Removes the listed callbacks from `id`. Returns how many were removed.
    pub fn remove(&mut self, id: &ObservableId, callback_ids: &[CallbackId]) -> usize {
        if callback_ids.is_empty() {
            return 0;
        }
        let Some(entries) = self.callbacks.get_mut(id) else {
            return 0;
        };

        let doomed: FxHashSet<CallbackId> = callback_ids.iter().copied().collect();
        let before = entries.len();
        entries.retain(|entry| !doomed.contains(&entry.id));
        let removed = before - entries.len();

        if entries.is_empty() {
            self.callbacks.remove(id);
        }
        removed
    }

    /// Returns the number of listeners on `id`.
    #[inline]
    #[must_use]
    pub fn len(&self, id: &ObservableId) -> usize {
        self.callbacks.get(id).map_or(0, Vec::len)
    }

    /// Returns the number of listeners across all observables.
    #[must_use]
    pub fn total(&self) -> usize {
        self.callbacks.values().map(Vec::len).sum()
    }

    /// Returns `true` if no listener is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
