//! Session-scoped protocol state.
//!
//! A [`Session`] owns everything one connection synchronizes: the
//! observable store, the callback registry, the object heap, and the link to
//! the outbound side of the open connection. It is owned by the session task
//! and mutated one turn at a time, so it needs no locks.
//!
//! # Example
//!
//! ```ignore
//! use jscall::session::Session;
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let mut session = Session::new();
//! session.attach(tx);
//!
//! session.update_remote("x".into(), 5.into())?;
//! assert_eq!(session.get(&"x".into())?, &serde_json::json!(5));
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `callbacks` | Ordered listeners per observable |
//! | `heap` | Handle to object mapping |
//! | `observables` | Observable values |

// ============================================================================
// Submodules
// ============================================================================

/// Callback registry.
pub mod callbacks;

/// Object heap.
pub mod heap;

/// Observable store.
pub mod observables;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CallbackId, ObservableId};
use crate::protocol::{CallArguments, Outbound, codec};
use crate::script::FunctionRef;

// ============================================================================
// Re-exports
// ============================================================================

pub use callbacks::{CallbackEntry, CallbackRegistry};
pub use heap::{HeapObject, ObjectHeap};
pub use observables::ObservableStore;

// ============================================================================
// Types
// ============================================================================

/// Sender half feeding encoded frames to the connection writer.
pub type OutboundSender = mpsc::UnboundedSender<String>;

// ============================================================================
// Session
// ============================================================================

/// Protocol state for one session.
#[derive(Debug, Default)]
pub struct Session {
    observables: ObservableStore,
    callbacks: CallbackRegistry,
    heap: ObjectHeap,
    outbound: Option<OutboundSender>,
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Creates an empty, detached session.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the observable store.
    #[inline]
    #[must_use]
    pub fn observables(&self) -> &ObservableStore {
        &self.observables
    }

    /// Returns the callback registry.
    #[inline]
    #[must_use]
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Returns the object heap.
    #[inline]
    #[must_use]
    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    /// Returns the object heap for mutation.
    #[inline]
    pub fn heap_mut(&mut self) -> &mut ObjectHeap {
        &mut self.heap
    }
}

// ============================================================================
// Session - Outbound
// ============================================================================

impl Session {
    /// Links the session to an open connection's writer.
    pub fn attach(&mut self, outbound: OutboundSender) {
        self.outbound = Some(outbound);
    }

    /// Unlinks the session from its connection.
    pub fn detach(&mut self) {
        self.outbound = None;
    }

    /// Returns `true` if an open connection is linked.
    #[inline]
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Serializes and queues `envelope` on the open connection.
    ///
    /// Nothing is buffered while detached.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no connection is open
    /// - [`Error::Json`] if the payload cannot be serialized
    pub fn send(&self, envelope: &Outbound) -> Result<()> {
        let outbound = self.outbound.as_ref().ok_or(Error::NotConnected)?;
        let text = codec::encode(envelope)?;
        outbound.send(text).map_err(|_| Error::NotConnected)
    }

    /// Logs a fault and relays it to the remote side.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if no connection is open.
    pub fn report_error(&self, message: &str, exception: impl fmt::Display) -> Result<()> {
        let exception = exception.to_string();
        error!(exception = %exception, "{message}");
        self.send(&Outbound::error(message, exception))
    }

    /// Logs a soft anomaly and relays it to the remote side.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if no connection is open.
    pub fn report_warning(&self, message: &str) -> Result<()> {
        warn!("{message}");
        self.send(&Outbound::warning(message))
    }
}

// ============================================================================
// Session - Observables
// ============================================================================

impl Session {
    /// Returns the current value of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObservableNotFound`] if `id` is not registered.
    #[inline]
    pub fn get(&self, id: &ObservableId) -> Result<&Value> {
        self.observables.get(id)
    }

    /// Registers `id` locally with an initial value, without notifying anyone.
    pub fn register_observable(&mut self, id: ObservableId, value: Value) {
        debug!(id = %id, "Observable registered");
        self.observables.set(id, value);
    }

    /// Discards `id` locally. Its callbacks stay registered.
    pub fn remove_observable(&mut self, id: &ObservableId) -> Option<Value> {
        self.observables.remove(id)
    }

    /// Applies a locally initiated update.
    ///
    /// For a known `id` the value is stored, callbacks run, and an
    /// `UpdateObservable` envelope goes upstream. For an unknown `id` one
    /// warning is relayed and the store is left untouched.
    ///
    /// # Returns
    ///
    /// `true` if the update was applied, `false` if `id` is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if no connection is open.
    pub fn update_local(&mut self, id: ObservableId, value: Value) -> Result<bool> {
        if !self.observables.contains(&id) {
            self.report_warning(&format!("Observable not found {id}. Deregistering!"))?;
            return Ok(false);
        }

        self.observables.set(id.clone(), value.clone());
        self.invoke_callbacks(&id, &value)?;
        self.send(&Outbound::UpdateObservable { id, payload: value })?;
        Ok(true)
    }

    /// Applies an update from the remote side, creating `id` if needed.
    ///
    /// # Errors
    ///
    /// Only fatal errors; callback faults are reported, not returned.
    pub fn update_remote(&mut self, id: ObservableId, value: Value) -> Result<()> {
        self.observables.set(id.clone(), value.clone());
        self.invoke_callbacks(&id, &value)
    }
}

// ============================================================================
// Session - Callbacks
// ============================================================================

impl Session {
    /// Appends a callback to `id`.
    pub fn register_callback(&mut self, id: ObservableId, function: FunctionRef) -> CallbackId {
        let callback_id = self.callbacks.register(id.clone(), function);
        debug!(id = %id, callback = %callback_id, "Callback registered");
        callback_id
    }

    /// Runs every callback of `id` with `value`, in registration order.
    ///
    /// The list is snapshotted first: callbacks registered during the pass
    /// run from the next update on. A failing callback is reported and the
    /// pass continues. Callbacks returning exactly `false` are removed once
    /// the pass is over.
    ///
    /// # Errors
    ///
    /// Only fatal errors.
    pub fn invoke_callbacks(&mut self, id: &ObservableId, value: &Value) -> Result<()> {
        let snapshot = self.callbacks.snapshot(id);
        if snapshot.is_empty() {
            return Ok(());
        }

        let mut deregister = Vec::new();
        for entry in &snapshot {
            match entry
                .function
                .call(self, CallArguments::single(value.clone()))
            {
                Ok(returned) if returned.is_false() => deregister.push(entry.id),
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let message = format!(
                        "Error during running onjs callback\nCallback:\n{}",
                        entry.function.source()
                    );
                    self.report_error(&message, Error::callback(e.to_string()))?;
                }
            }
        }

        let removed = self.callbacks.remove(id, &deregister);
        if removed > 0 {
            debug!(id = %id, removed, "Callbacks deregistered themselves");
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
