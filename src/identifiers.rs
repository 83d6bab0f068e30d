//! Type-safe identifiers for protocol entities.
//!
//! The remote side names observables and heap objects with opaque keys
//! that may be JSON strings or JSON integers. Keys keep their wire
//! representation so that echoed envelopes carry the exact id the remote
//! side used, but compare by decimal form: `5` and `"5"` name the same
//! entry, while `"05"` does not.
//!
//! | Type | Names |
//! |------|-------|
//! | [`ObservableId`] | A synchronized observable |
//! | [`HeapHandle`] | An object stored on the session heap |
//! | [`CallbackId`] | A registered callback (local only, never on the wire) |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

// ============================================================================
// OpaqueKey
// ============================================================================

/// A wire key: either an integer or a string.
///
/// Equality and hashing use the decimal form, so an integer key and the
/// string of its digits are the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpaqueKey {
    /// Integer key.
    Int(i64),
    /// String key.
    Str(String),
}

impl OpaqueKey {
    /// Returns the form keys are compared by.
    fn canonical(&self) -> Cow<'_, str> {
        match self {
            Self::Int(n) => Cow::Owned(n.to_string()),
            Self::Str(s) => Cow::Borrowed(s),
        }
    }
}

impl PartialEq for OpaqueKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => self.canonical() == other.canonical(),
        }
    }
}

impl Eq for OpaqueKey {}

impl Hash for OpaqueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Display for OpaqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for OpaqueKey {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for OpaqueKey {
    #[inline]
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for OpaqueKey {
    #[inline]
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

// ============================================================================
// Key Newtypes
// ============================================================================

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(OpaqueKey);

        impl $name {
            /// Creates an identifier from any key representation.
            #[inline]
            #[must_use]
            pub fn new(key: impl Into<OpaqueKey>) -> Self {
                Self(key.into())
            }

            /// Returns the underlying wire key.
            #[inline]
            #[must_use]
            pub fn key(&self) -> &OpaqueKey {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $name {
            #[inline]
            fn from(value: i64) -> Self {
                Self(OpaqueKey::Int(value))
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(OpaqueKey::from(value))
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(value: String) -> Self {
                Self(OpaqueKey::Str(value))
            }
        }
    };
}

opaque_id!(
    /// Identifier of a synchronized observable.
    ObservableId
);

opaque_id!(
    /// Handle naming an object on the session heap.
    HeapHandle
);

// ============================================================================
// CallbackId
// ============================================================================

/// Session-unique identifier of a registered callback.
///
/// Used to remove callbacks by identity after an invocation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
    /// Creates a callback ID from a raw counter value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb#{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_id_roundtrips_as_string() {
        let id: ObservableId = serde_json::from_str(r#""slider""#).expect("parse");
        assert_eq!(id, ObservableId::from("slider"));
        assert_eq!(serde_json::to_string(&id).expect("serialize"), r#""slider""#);
    }

    #[test]
    fn test_integer_id_keeps_representation() {
        let handle: HeapHandle = serde_json::from_str("42").expect("parse");
        assert_eq!(handle, HeapHandle::from(42_i64));
        assert_eq!(serde_json::to_string(&handle).expect("serialize"), "42");
    }

    #[test]
    fn test_int_and_digit_string_are_one_key() {
        assert_eq!(ObservableId::from(5_i64), ObservableId::from("5"));
        assert_ne!(ObservableId::from(5_i64), ObservableId::from("05"));
        assert_ne!(HeapHandle::from(-1_i64), HeapHandle::from("1"));

        let mut ids = rustc_hash::FxHashSet::default();
        ids.insert(ObservableId::from(5_i64));
        assert!(ids.contains(&ObservableId::from("5")));
    }

    #[test]
    fn test_key_keeps_wire_form() {
        let id: ObservableId = serde_json::from_str("5").expect("parse");
        assert_eq!(id, ObservableId::from("5"));
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "5");
    }

    #[test]
    fn test_display() {
        assert_eq!(ObservableId::from("x").to_string(), "x");
        assert_eq!(HeapHandle::from(7_i64).to_string(), "7");
        assert_eq!(CallbackId::new(3).to_string(), "cb#3");
    }

    #[test]
    fn test_float_key_rejected() {
        assert!(serde_json::from_str::<ObservableId>("1.5").is_err());
    }
}
