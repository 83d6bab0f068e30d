//! Connection lifecycle state machine.
//!
//! ```text
//!                 Start            Handshake           TransportClosed
//! Disconnected ─────────► Connecting ─────────► Open ─────────────────► Closed
//!                              │                                          │
//!                              └──────── TransportClosed ────────────────►│
//!                                                                         │
//!           Connecting ◄──────────────────── Start (retry) ───────────────┘
//! ```
//!
//! Transport errors never move the machine; the close that follows does.

use std::fmt;

use crate::error::{Error, Result};

/// Lifecycle state of the session's single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection attempted yet.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Connected; envelopes flow both ways.
    Open,
    /// Connection gone.
    Closed,
}

/// Input to the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Session start or reconnect attempt.
    Start,
    /// WebSocket handshake completed.
    Handshake,
    /// Transport error observed.
    TransportError,
    /// Connection closed or failed to open.
    TransportClosed,
}

impl ConnectionState {
    /// Applies `event`, returning the next state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] when a second connection would be
    /// opened, or a handshake completes outside `Connecting`.
    pub fn on(self, event: LifecycleEvent) -> Result<Self> {
        use ConnectionState::*;
        use LifecycleEvent::*;

        match (self, event) {
            (Disconnected | Closed, Start) => Ok(Connecting),
            (Connecting | Open, Start) => Err(Error::invariant(format!(
                "Inconsistent state. Already opened a websocket! (state: {self})"
            ))),
            (Connecting, Handshake) => Ok(Open),
            (_, Handshake) => Err(Error::invariant(format!(
                "handshake completed while {self}"
            ))),
            (Connecting | Open, TransportClosed) => Ok(Closed),
            (state, TransportClosed | TransportError) => Ok(state),
        }
    }

    /// Returns `true` when envelopes can be sent.
    #[inline]
    #[must_use]
    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
