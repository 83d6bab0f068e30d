//! jscall - Bidirectional observable sync and remote calls over WebSocket.
//!
//! This library keeps named observable values in sync between a host
//! process and a remote peer, and lets the peer call host functions and
//! read or write host objects by handle.
//!
//! # Architecture
//!
//! The session follows a single-owner model:
//!
//! - **Local End (Rust)**: Owns observables, listeners and the object heap
//! - **Remote End (peer)**: Sends updates and calls, receives updates and errors
//!
//! Key design principles:
//!
//! - Each session owns: one WebSocket connection + one event loop task
//! - Envelopes are flat JSON objects tagged by a `type` string (`"0"`..`"8"`)
//! - Script text from the peer goes through a [`ScriptEngine`] capability
//! - Failures while handling an envelope are reported back, never fatal
//!
//! # Quick Start
//!
//! ```no_run
//! use jscall::{NativeEngine, NativeFn, Result, SessionConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let engine = NativeEngine::new().with_function(
//!         "log_volume",
//!         NativeFn::new("log_volume", |_session, args| {
//!             println!("volume: {:?}", args.get(0));
//!             Ok(json!(true))
//!         })
//!         .into_ref(),
//!     );
//!
//!     let config = SessionConfig::from_env()?;
//!     let handle = jscall::start(config, engine).await?;
//!
//!     handle.register_observable("volume", 3).await?;
//!     handle.update("volume", 4).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Session configuration |
//! | [`dispatch`] | Inbound envelope routing |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire envelopes and codec |
//! | [`script`] | Script engine capability and host functions |
//! | [`session`] | Observables, listeners and the object heap |
//! | [`transport`] | WebSocket transport layer |

// ============================================================================
// Modules
// ============================================================================

/// Session configuration.
///
/// Use [`SessionConfig::from_env()`] or [`SessionConfig::new()`].
pub mod config;

/// Inbound envelope routing.
pub mod dispatch;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for observables, heap entries and listeners.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire envelopes and codec.
pub mod protocol;

/// Script engine capability and host functions.
pub mod script;

/// Observables, listeners and the object heap.
pub mod session;

/// WebSocket transport layer.
///
/// Handles the connection, its lifecycle and reconnects.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::SessionConfig;

// Dispatch
pub use dispatch::Dispatcher;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallbackId, HeapHandle, ObservableId, OpaqueKey};

// Protocol types
pub use protocol::{CallArguments, Inbound, JsCall, MessageType, Outbound};

// Script types
pub use script::{FunctionRef, NativeEngine, NativeFn, NativeFunction, ScriptEngine};

// Session types
pub use session::{HeapObject, Session};

// Transport types
pub use transport::{ConnectionManager, ConnectionState, RetryPolicy, SessionHandle};

// ============================================================================
// Entry Point
// ============================================================================

/// Starts a session: connects to the derived WebSocket URL and serves it on
/// a spawned task.
///
/// # Errors
///
/// - [`Error::Config`] / [`Error::Url`] if no connection URL can be derived
/// - [`Error::Connection`] if the first connection attempt fails
pub async fn start(
    config: SessionConfig,
    engine: impl ScriptEngine + 'static,
) -> Result<SessionHandle> {
    ConnectionManager::start(config, engine).await
}
