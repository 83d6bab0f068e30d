//! Envelope encoding and decoding.
//!
//! Envelopes travel as WebSocket text frames holding one JSON object.
//! Decoding happens in two steps: the `type` tag is inspected first so an
//! unknown tag is reported as [`Error::UnrecognizedMessageType`] rather than
//! as a generic parse failure.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, from_str, from_value, to_string};
use tracing::trace;

use crate::error::{Error, Result};

use super::{Inbound, MessageType, Outbound};

// ============================================================================
// Decoding
// ============================================================================

/// Decodes an inbound text frame.
///
/// # Errors
///
/// - [`Error::Json`] if the frame is not JSON
/// - [`Error::Protocol`] if the frame has no usable `type` or misses fields
/// - [`Error::UnrecognizedMessageType`] for tags outside the inbound set
pub fn decode(text: &str) -> Result<Inbound> {
    let mut value: Value = from_str(text)?;
    let tag = message_tag(&value)?;

    match MessageType::from_tag(&tag) {
        Some(kind) if kind.is_inbound() => {
            trace!(tag = %tag, "Decoding envelope");
            // Numeric tags are accepted; the envelope types match on strings.
            value["type"] = Value::String(tag);
            from_value(value).map_err(|e| Error::protocol(format!("malformed envelope: {e}")))
        }
        _ => Err(Error::unrecognized(tag)),
    }
}

/// Decodes an outbound envelope, as the remote side would.
///
/// # Errors
///
/// Returns [`Error::Json`] if the frame is not a valid outbound envelope.
pub fn decode_outbound(text: &str) -> Result<Outbound> {
    Ok(from_str(text)?)
}

/// Extracts the `type` tag, accepting strings and integers.
fn message_tag(value: &Value) -> Result<String> {
    match value.get("type") {
        Some(Value::String(tag)) => Ok(tag.clone()),
        Some(Value::Number(tag)) => Ok(tag.to_string()),
        Some(other) => Err(Error::protocol(format!("invalid message type: {other}"))),
        None => Err(Error::protocol("envelope has no type")),
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encodes an outbound envelope as a text frame.
///
/// # Errors
///
/// Returns [`Error::Json`] if a payload cannot be serialized.
pub fn encode(envelope: &Outbound) -> Result<String> {
    Ok(to_string(envelope)?)
}

/// Encodes an inbound envelope, as the remote side would.
///
/// # Errors
///
/// Returns [`Error::Json`] if a payload cannot be serialized.
pub fn encode_inbound(envelope: &Inbound) -> Result<String> {
    Ok(to_string(envelope)?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::ObservableId;
    use serde_json::json;

    #[test]
    fn test_decode_update() {
        let inbound = decode(r#"{"type":"0","id":"x","payload":5}"#).expect("decode");
        assert_eq!(
            inbound,
            Inbound::UpdateObservable {
                id: ObservableId::from("x"),
                payload: json!(5),
            }
        );
    }

    #[test]
    fn test_decode_unknown_tag() {
        let err = decode(r#"{"type":"99"}"#).unwrap_err();
        assert!(matches!(err, Error::UnrecognizedMessageType { ref tag } if tag == "99"));
    }

    #[test]
    fn test_decode_numeric_tag() {
        let inbound = decode(r#"{"type":2,"payload":"noop"}"#).expect("decode");
        assert!(matches!(inbound, Inbound::EvalJavascript { .. }));

        let inbound = decode(r#"{"type":8,"handle":3}"#).expect("decode");
        assert!(matches!(inbound, Inbound::ReleaseHandle { .. }));
    }

    #[test]
    fn test_decode_outbound_only_tag_is_unrecognized() {
        let err = decode(r#"{"type":"3","message":"m","exception":"e"}"#).unwrap_err();
        assert!(matches!(err, Error::UnrecognizedMessageType { .. }));
    }

    #[test]
    fn test_decode_missing_field() {
        let err = decode(r#"{"type":"1","payload":"f"}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_decode_missing_type() {
        let err = decode(r#"{"id":"x"}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_decode_not_json() {
        let err = decode("not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_encode_warning() {
        let text = encode(&Outbound::warning("w")).expect("encode");
        let back = decode_outbound(&text).expect("decode");
        assert_eq!(back, Outbound::warning("w"));
    }

    #[test]
    fn test_encode_inbound_release() {
        let text = encode_inbound(&Inbound::ReleaseHandle {
            handle: crate::identifiers::HeapHandle::from("h"),
        })
        .expect("encode");
        assert_eq!(
            serde_json::from_str::<Value>(&text).expect("json"),
            json!({"type": "8", "handle": "h"})
        );
    }
}
