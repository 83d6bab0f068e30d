//! WebSocket transport layer.
//!
//! This module handles the session's single connection to the remote side.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                        ┌─────────────────┐
//! │  ConnectionManager   │        WebSocket       │  Remote side    │
//! │  (session task)      │◄──────────────────────►│                 │
//! │  Session + Dispatcher│  ws://host/<session>/  │                 │
//! └──────────▲───────────┘                        └─────────────────┘
//!            │ commands
//!     SessionHandle (host)
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `websocket_url` - Derive the target from the page location
//! 2. `ConnectionManager::start` - Connect, then spawn the session task
//! 3. Envelopes flow; host work arrives through `SessionHandle`
//! 4. On close, `RetryPolicy` decides whether to reconnect
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Connection manager and event loop |
//! | `retry` | Reconnect policy |
//! | `state` | Lifecycle state machine |
//! | `url` | Connection target derivation |

// ============================================================================
// Submodules
// ============================================================================

/// Connection manager and event loop.
pub mod connection;

/// Reconnect policy.
pub mod retry;

/// Lifecycle state machine.
pub mod state;

/// Connection target derivation.
pub mod url;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{ConnectionManager, SessionHandle};
pub use retry::RetryPolicy;
pub use state::{ConnectionState, LifecycleEvent};
pub use url::websocket_url;
