//! WebSocket protocol message types.
//!
//! This module defines the envelope format exchanged between the local
//! session (Rust) and the remote side.
//!
//! # Protocol Overview
//!
//! Every envelope is a flat JSON object with a short string `type` tag:
//!
//! | Tag | Message Type | Direction | Purpose |
//! |-----|--------------|-----------|---------|
//! | `"0"` | `UpdateObservable` | Both | Observable value changed |
//! | `"1"` | `OnjsCallback` | Remote → Local | Register an update listener |
//! | `"2"` | `EvalJavascript` | Remote → Local | Run code for side effects |
//! | `"3"` | `JavascriptError` | Local → Remote | Fault report |
//! | `"4"` | `JavascriptWarning` | Local → Remote | Soft anomaly report |
//! | `"5"` | `JSCall` | Remote → Local | Call a heap function |
//! | `"6"` | `JSGetIndex` | Remote → Local | Read an indexed heap value |
//! | `"7"` | `JSSetIndex` | Remote → Local | Write an indexed heap value |
//! | `"8"` | `ReleaseHandle` | Remote → Local | Drop a heap entry |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Text encoding and decoding |
//! | `envelope` | Inbound and outbound envelope types |

// ============================================================================
// Submodules
// ============================================================================

/// Envelope encoding and decoding.
pub mod codec;

/// Inbound and outbound envelope types.
pub mod envelope;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{CallArguments, Inbound, JsCall, Outbound};

// ============================================================================
// MessageType
// ============================================================================

/// The closed set of envelope types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Observable value changed.
    UpdateObservable,
    /// Register a callback on an observable.
    OnjsCallback,
    /// Evaluate code for side effects.
    EvalJavascript,
    /// Fault report to the remote side.
    JavascriptError,
    /// Warning report to the remote side.
    JavascriptWarning,
    /// Call a function stored on the heap.
    JsCall,
    /// Indexed read from a heap object.
    JsGetIndex,
    /// Indexed write into a heap object.
    JsSetIndex,
    /// Release a heap handle.
    ReleaseHandle,
}

impl MessageType {
    /// All message types, in tag order.
    pub const ALL: [Self; 9] = [
        Self::UpdateObservable,
        Self::OnjsCallback,
        Self::EvalJavascript,
        Self::JavascriptError,
        Self::JavascriptWarning,
        Self::JsCall,
        Self::JsGetIndex,
        Self::JsSetIndex,
        Self::ReleaseHandle,
    ];

    /// Returns the wire tag.
    #[inline]
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::UpdateObservable => "0",
            Self::OnjsCallback => "1",
            Self::EvalJavascript => "2",
            Self::JavascriptError => "3",
            Self::JavascriptWarning => "4",
            Self::JsCall => "5",
            Self::JsGetIndex => "6",
            Self::JsSetIndex => "7",
            Self::ReleaseHandle => "8",
        }
    }

    /// Looks up a message type by wire tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Returns `true` if the remote side may send this type.
    #[inline]
    #[must_use]
    pub const fn is_inbound(self) -> bool {
        !matches!(self, Self::JavascriptError | Self::JavascriptWarning)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_unique() {
        for (i, kind) in MessageType::ALL.iter().enumerate() {
            assert_eq!(kind.tag(), i.to_string());
            assert_eq!(MessageType::from_tag(kind.tag()), Some(*kind));
        }
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(MessageType::from_tag("99"), None);
        assert_eq!(MessageType::from_tag(""), None);
    }

    #[test]
    fn test_outbound_only_types() {
        assert!(!MessageType::JavascriptError.is_inbound());
        assert!(!MessageType::JavascriptWarning.is_inbound());
        assert!(MessageType::UpdateObservable.is_inbound());
        assert!(MessageType::JsCall.is_inbound());
    }
}
