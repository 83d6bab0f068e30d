//! Error types for jscall.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use jscall::{Result, SessionHandle};
//!
//! async fn example(handle: &SessionHandle) -> Result<()> {
//!     handle.update("counter", 5).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::NotConnected`], [`Error::InvariantViolation`] |
//! | Protocol | [`Error::Protocol`], [`Error::UnrecognizedMessageType`] |
//! | State | [`Error::ObservableNotFound`], [`Error::HeapObjectNotFound`] |
//! | Execution | [`Error::Script`], [`Error::CallbackInvocation`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |
//!
//! # Propagation
//!
//! Only fatal errors ([`Error::is_fatal`]) cross the dispatch boundary.
//! Everything else raised while handling one envelope is relayed to the
//! remote side as an error envelope and processing continues.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{HeapHandle, ObservableId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when session configuration is missing or invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Session task is gone; the connection was closed for good.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Outbound send attempted without an open connection.
    #[error("No open connection to send on")]
    NotConnected,

    /// A protocol invariant was broken by the host (e.g. a second connection).
    #[error("Invariant violation: {message}")]
    InvariantViolation {
        /// Description of the broken invariant.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed envelope.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Envelope carried a `type` tag outside the inbound taxonomy.
    #[error("Unrecognized message type: {tag}.")]
    UnrecognizedMessageType {
        /// The offending tag, as received.
        tag: String,
    },

    // ========================================================================
    // State Errors
    // ========================================================================
    /// Observable id is not registered.
    #[error("Can't find observable with id: {id}")]
    ObservableNotFound {
        /// The missing observable id.
        id: ObservableId,
    },

    /// Heap handle does not resolve to an object.
    #[error("Can't find heap object with handle: {handle}")]
    HeapObjectNotFound {
        /// The missing handle.
        handle: HeapHandle,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Code could not be compiled or evaluated, or a call failed.
    #[error("Script error: {message}")]
    Script {
        /// Description of the failure.
        message: String,
    },

    /// A registered callback failed while being invoked.
    #[error("Callback failed: {message}")]
    CallbackInvocation {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates an invariant violation error.
    #[inline]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an unrecognized message type error.
    #[inline]
    pub fn unrecognized(tag: impl Into<String>) -> Self {
        Self::UnrecognizedMessageType { tag: tag.into() }
    }

    /// Creates an observable not found error.
    #[inline]
    pub fn observable_not_found(id: ObservableId) -> Self {
        Self::ObservableNotFound { id }
    }

    /// Creates a heap object not found error.
    #[inline]
    pub fn heap_object_not_found(handle: HeapHandle) -> Self {
        Self::HeapObjectNotFound { handle }
    }

    /// Creates a script error.
    #[inline]
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Creates a callback invocation error.
    #[inline]
    pub fn callback(message: impl Into<String>) -> Self {
        Self::CallbackInvocation {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error must not be contained by the dispatcher.
    ///
    /// Fatal errors indicate a programming error in the host, not a
    /// transient condition.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotConnected | Self::InvariantViolation { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::NotConnected
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a lookup miss in session state.
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ObservableNotFound { .. } | Self::HeapObjectNotFound { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
