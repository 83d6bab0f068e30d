//! Inbound and outbound envelope types.
//!
//! Inbound envelopes arrive from the remote side and are routed by the
//! dispatcher. Outbound envelopes are produced by local operations and
//! faults.

// ============================================================================
// Imports
// ============================================================================

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::identifiers::{HeapHandle, ObservableId, OpaqueKey};

// ============================================================================
// Inbound
// ============================================================================

/// An envelope from the remote side.
///
/// # Format
///
/// ```json
/// { "type": "0", "id": "slider", "payload": 12 }
/// { "type": "1", "id": "slider", "payload": "log_value" }
/// { "type": "5", "func": 1, "arguments": [1, 2], "needs_new": false, "result": 2 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Inbound {
    /// Set an observable and fire its callbacks.
    #[serde(rename = "0")]
    UpdateObservable {
        /// Observable id.
        id: ObservableId,
        /// New value.
        #[serde(default)]
        payload: Value,
    },

    /// Register a callback compiled from source.
    #[serde(rename = "1")]
    OnjsCallback {
        /// Observable id the callback listens on.
        id: ObservableId,
        /// Callback source.
        payload: String,
    },

    /// Evaluate source for side effects.
    #[serde(rename = "2")]
    EvalJavascript {
        /// Source to evaluate.
        payload: String,
    },

    /// Call a heap function.
    #[serde(rename = "5")]
    JsCall(JsCall),

    /// Read `object[index]` into `result`.
    #[serde(rename = "6")]
    JsGetIndex {
        /// Handle of the indexed object.
        object: HeapHandle,
        /// Array index or object key.
        index: OpaqueKey,
        /// Handle receiving the read value.
        result: HeapHandle,
    },

    /// Write `value` into `object[index]`.
    #[serde(rename = "7")]
    JsSetIndex {
        /// Handle of the indexed object.
        object: HeapHandle,
        /// Array index or object key.
        index: OpaqueKey,
        /// Value to store.
        #[serde(default)]
        value: Value,
    },

    /// Drop a heap entry.
    #[serde(rename = "8")]
    ReleaseHandle {
        /// Handle to release.
        handle: HeapHandle,
    },
}

// ============================================================================
// JsCall
// ============================================================================

/// Fields of a `JSCall` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsCall {
    /// Handle of the function to call.
    pub func: HeapHandle,

    /// Call arguments.
    #[serde(default)]
    pub arguments: CallArguments,

    /// Use construction semantics instead of a plain call.
    #[serde(default)]
    pub needs_new: bool,

    /// Handle receiving the return value.
    pub result: HeapHandle,
}

// ============================================================================
// CallArguments
// ============================================================================

/// Call shape of a remote function call.
///
/// A JSON array spreads into positional arguments; a JSON object is passed
/// as a single keyed argument. Absent or `null` arguments mean a positional
/// call with zero arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArguments {
    /// Spread positional arguments.
    Positional(Vec<Value>),
    /// One keyed argument structure.
    Keyed(Map<String, Value>),
}

impl CallArguments {
    /// Creates a positional argument list.
    #[inline]
    #[must_use]
    pub fn positional(args: impl IntoIterator<Item = Value>) -> Self {
        Self::Positional(args.into_iter().collect())
    }

    /// Creates a single-argument positional list.
    #[inline]
    #[must_use]
    pub fn single(value: Value) -> Self {
        Self::Positional(vec![value])
    }

    /// Returns the number of arguments the callee receives.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(args) => args.len(),
            Self::Keyed(_) => 1,
        }
    }

    /// Returns `true` for a zero-argument call.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the argument at `position` as the callee sees it.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<Value> {
        match self {
            Self::Positional(args) => args.get(position).cloned(),
            Self::Keyed(map) if position == 0 => Some(Value::Object(map.clone())),
            Self::Keyed(_) => None,
        }
    }

    /// Flattens into the argument list the callee receives.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Self::Positional(args) => args,
            Self::Keyed(map) => vec![Value::Object(map)],
        }
    }
}

impl Default for CallArguments {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl Serialize for CallArguments {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Positional(args) => args.serialize(serializer),
            Self::Keyed(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CallArguments {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(Value::Array(args)) => Ok(Self::Positional(args)),
            Some(Value::Object(map)) => Ok(Self::Keyed(map)),
            Some(other) => Err(D::Error::custom(format!(
                "arguments must be an array or an object, got {other}"
            ))),
        }
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// An envelope sent to the remote side.
///
/// # Format
///
/// ```json
/// { "type": "0", "id": "slider", "payload": 12 }
/// { "type": "3", "message": "...", "exception": "..." }
/// { "type": "4", "message": "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Outbound {
    /// A locally initiated observable update.
    #[serde(rename = "0")]
    UpdateObservable {
        /// Observable id.
        id: ObservableId,
        /// New value.
        payload: Value,
    },

    /// A caught fault.
    #[serde(rename = "3")]
    Error {
        /// Human-readable context.
        message: String,
        /// Stringified fault detail.
        exception: String,
    },

    /// A soft anomaly.
    #[serde(rename = "4")]
    Warning {
        /// Human-readable description.
        message: String,
    },
}

impl Outbound {
    /// Creates an error envelope.
    #[inline]
    #[must_use]
    pub fn error(message: impl Into<String>, exception: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            exception: exception.into(),
        }
    }

    /// Creates a warning envelope.
    #[inline]
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
        }
    }

    /// Returns `true` for error envelopes.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Returns `true` for warning envelopes.
    #[inline]
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warning { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_observable_format() {
        let envelope = Outbound::UpdateObservable {
            id: ObservableId::from("x"),
            payload: json!(5),
        };
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(value, json!({"type": "0", "id": "x", "payload": 5}));
    }

    #[test]
    fn test_error_format() {
        let value = serde_json::to_value(Outbound::error("context", "boom")).expect("serialize");
        assert_eq!(
            value,
            json!({"type": "3", "message": "context", "exception": "boom"})
        );
    }

    #[test]
    fn test_warning_format() {
        let value = serde_json::to_value(Outbound::warning("careful")).expect("serialize");
        assert_eq!(value, json!({"type": "4", "message": "careful"}));
    }

    #[test]
    fn test_js_call_positional() {
        let inbound: Inbound = serde_json::from_value(json!({
            "type": "5", "func": 1, "arguments": [1, 2], "needs_new": false, "result": 2
        }))
        .expect("parse");

        let Inbound::JsCall(call) = inbound else {
            panic!("expected JsCall");
        };
        assert_eq!(call.func, HeapHandle::from(1_i64));
        assert_eq!(call.arguments, CallArguments::positional([json!(1), json!(2)]));
        assert!(!call.needs_new);
        assert_eq!(call.result, HeapHandle::from(2_i64));
    }

    #[test]
    fn test_js_call_keyed() {
        let call: JsCall = serde_json::from_value(json!({
            "func": "f", "arguments": {"a": 1}, "result": "r"
        }))
        .expect("parse");

        assert!(matches!(call.arguments, CallArguments::Keyed(_)));
        assert_eq!(call.arguments.len(), 1);
        assert_eq!(call.arguments.get(0), Some(json!({"a": 1})));
    }

    #[test]
    fn test_js_call_missing_or_null_arguments_is_empty_positional() {
        let missing: JsCall =
            serde_json::from_value(json!({"func": "f", "result": "r"})).expect("parse");
        let null: JsCall =
            serde_json::from_value(json!({"func": "f", "arguments": null, "result": "r"}))
                .expect("parse");
        let empty: JsCall =
            serde_json::from_value(json!({"func": "f", "arguments": [], "result": "r"}))
                .expect("parse");

        for call in [missing, null, empty] {
            assert_eq!(call.arguments, CallArguments::Positional(vec![]));
            assert!(call.arguments.is_empty());
        }
    }

    #[test]
    fn test_js_call_scalar_arguments_rejected() {
        let result = serde_json::from_value::<JsCall>(json!({
            "func": "f", "arguments": 3, "result": "r"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_keyed_into_values() {
        let mut map = Map::new();
        map.insert("k".into(), json!("v"));
        let values = CallArguments::Keyed(map).into_values();
        assert_eq!(values, vec![json!({"k": "v"})]);
    }

    #[test]
    fn test_update_observable_missing_payload_is_null() {
        let inbound: Inbound =
            serde_json::from_value(json!({"type": "0", "id": "x"})).expect("parse");
        assert_eq!(
            inbound,
            Inbound::UpdateObservable {
                id: ObservableId::from("x"),
                payload: Value::Null,
            }
        );
    }
}
