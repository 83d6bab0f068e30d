//! Callable objects exposed to the remote side.
//!
//! Everything the remote side can invoke, whether a callback registered on
//! an observable or a function called through a heap handle, is a
//! [`NativeFunction`]. Calls receive the session so a function may update
//! observables or touch the heap within the same turn.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::protocol::CallArguments;
use crate::session::{HeapObject, Session};

// ============================================================================
// Types
// ============================================================================

/// Shared reference to a callable.
pub type FunctionRef = Arc<dyn NativeFunction>;

/// Closure signature backing a [`NativeFn`].
pub type CallFn = dyn Fn(&mut Session, CallArguments) -> Result<Value> + Send + Sync;

// ============================================================================
// NativeFunction
// ============================================================================

/// A function the remote side may call.
pub trait NativeFunction: Send + Sync {
    /// Invokes the function.
    ///
    /// # Errors
    ///
    /// Any error is reported to the remote side by the caller.
    fn call(&self, session: &mut Session, args: CallArguments) -> Result<HeapObject>;

    /// Invokes the function with construction semantics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Script`] unless the function supports construction.
    fn construct(&self, session: &mut Session, args: CallArguments) -> Result<HeapObject> {
        let _ = (session, args);
        Err(Error::script(format!("{} is not a constructor", self.source())))
    }

    /// Source representation, used in fault reports.
    fn source(&self) -> &str;
}

// ============================================================================
// NativeFn
// ============================================================================

/// A [`NativeFunction`] built from closures.
///
/// # Example
///
/// ```ignore
/// use jscall::script::NativeFn;
///
/// let add = NativeFn::new("add", |_session, args| {
///     let a = args.get(0).and_then(|v| v.as_i64()).unwrap_or(0);
///     let b = args.get(1).and_then(|v| v.as_i64()).unwrap_or(0);
///     Ok((a + b).into())
/// })
/// .into_ref();
/// ```
pub struct NativeFn {
    name: String,
    call: Box<CallFn>,
    construct: Option<Box<CallFn>>,
}

impl NativeFn {
    /// Creates a function from a call closure.
    #[must_use]
    pub fn new<F>(name: impl Into<String>, call: F) -> Self
    where
        F: Fn(&mut Session, CallArguments) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            call: Box::new(call),
            construct: None,
        }
    }

    /// Adds construction semantics.
    #[must_use]
    pub fn with_constructor<F>(mut self, construct: F) -> Self
    where
        F: Fn(&mut Session, CallArguments) -> Result<Value> + Send + Sync + 'static,
    {
        self.construct = Some(Box::new(construct));
        self
    }

    /// Wraps into a shared [`FunctionRef`].
    #[inline]
    #[must_use]
    pub fn into_ref(self) -> FunctionRef {
        Arc::new(self)
    }
}

impl NativeFunction for NativeFn {
    fn call(&self, session: &mut Session, args: CallArguments) -> Result<HeapObject> {
        (self.call)(session, args).map(HeapObject::Value)
    }

    fn construct(&self, session: &mut Session, args: CallArguments) -> Result<HeapObject> {
        match &self.construct {
            Some(construct) => construct(session, args).map(HeapObject::Value),
            None => Err(Error::script(format!("{} is not a constructor", self.name))),
        }
    }

    fn source(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("name", &self.name)
            .field("constructor", &self.construct.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
