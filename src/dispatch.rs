//! Inbound envelope dispatch.
//!
//! The [`Dispatcher`] routes one decoded envelope per turn to its handler.
//! Every handler is isolated: a non-fatal failure is turned into exactly one
//! outbound error envelope, and the next envelope is processed normally.
//!
//! | Envelope | Handler |
//! |----------|---------|
//! | `UpdateObservable` | [`Session::update_remote`] |
//! | `OnjsCallback` | [`ScriptEngine::compile`] then [`Session::register_callback`] |
//! | `EvalJavascript` | [`ScriptEngine::eval`] |
//! | `JSCall` | heap lookup, call or construct, store result |
//! | `JSGetIndex` / `JSSetIndex` | indexed heap access |
//! | `ReleaseHandle` | heap release |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::{HeapHandle, OpaqueKey};
use crate::protocol::{Inbound, JsCall, codec};
use crate::script::ScriptEngine;
use crate::session::{HeapObject, Session};

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes inbound envelopes to handlers.
pub struct Dispatcher {
    engine: Box<dyn ScriptEngine>,
}

impl Dispatcher {
    /// Creates a dispatcher evaluating code with `engine`.
    #[must_use]
    pub fn new(engine: impl ScriptEngine + 'static) -> Self {
        Self {
            engine: Box::new(engine),
        }
    }

    /// Decodes and dispatches one text frame.
    ///
    /// Undecodable frames and unknown types are reported to the remote side.
    ///
    /// # Errors
    ///
    /// Only fatal errors ([`Error::is_fatal`]).
    pub fn dispatch_text(&self, session: &mut Session, text: &str) -> Result<()> {
        match codec::decode(text) {
            Ok(envelope) => self.dispatch(session, envelope),
            Err(e @ Error::UnrecognizedMessageType { .. }) => session.report_error(&e.to_string(), ""),
            Err(e) => session.report_error("Error while decoding message from remote.", e),
        }
    }

    /// Dispatches one decoded envelope.
    ///
    /// # Errors
    ///
    /// Only fatal errors ([`Error::is_fatal`]).
    pub fn dispatch(&self, session: &mut Session, envelope: Inbound) -> Result<()> {
        trace!(?envelope, "Dispatching envelope");

        match envelope {
            Inbound::UpdateObservable { id, payload } => {
                let context = format!("Error while updating observable {id} from remote!");
                let result = session.update_remote(id, payload);
                contain(session, context, result)
            }

            Inbound::OnjsCallback { id, payload } => {
                let result = self
                    .engine
                    .compile(&payload)
                    .map(|function| {
                        session.register_callback(id, function);
                    });
                contain(
                    session,
                    format!(
                        "Error while registering an onjs callback.\nonjs function source:\n{payload}"
                    ),
                    result,
                )
            }

            Inbound::EvalJavascript { payload } => {
                let result = self.engine.eval(session, &payload);
                contain(
                    session,
                    format!("Error while evaluating code from remote. Source:\n{payload}"),
                    result,
                )
            }

            Inbound::JsCall(call) => {
                let context = format!(
                    "Error while calling function from remote. Function handle: {}",
                    call.func
                );
                let result = js_call(session, call);
                contain(session, context, result)
            }

            Inbound::JsGetIndex {
                object,
                index,
                result,
            } => {
                let context = format!("Error while reading index {index} of heap object {object}.");
                let outcome = get_index(session, &object, &index, result);
                contain(session, context, outcome)
            }

            Inbound::JsSetIndex {
                object,
                index,
                value,
            } => {
                let context = format!("Error while writing index {index} of heap object {object}.");
                let outcome = session
                    .heap_mut()
                    .get_mut(&object)
                    .and_then(|target| target.set_index(&index, value));
                contain(session, context, outcome)
            }

            Inbound::ReleaseHandle { handle } => {
                if session.heap_mut().release(&handle).is_some() {
                    debug!(handle = %handle, "Heap handle released");
                    Ok(())
                } else {
                    session.report_warning(&format!(
                        "Heap object not found {handle}. Nothing to release."
                    ))
                }
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Converts a handler failure into an error envelope, passing fatal ones up.
fn contain(session: &mut Session, context: String, result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => session.report_error(&context, e),
    }
}

fn js_call(session: &mut Session, call: JsCall) -> Result<()> {
    let function = session
        .heap()
        .get(&call.func)?
        .as_function()
        .cloned()
        .ok_or_else(|| Error::script(format!("heap object {} is not callable", call.func)))?;

    debug!(
        func = %call.func,
        source = function.source(),
        argc = call.arguments.len(),
        needs_new = call.needs_new,
        "Calling heap function"
    );

    let returned = if call.needs_new {
        function.construct(session, call.arguments)?
    } else {
        function.call(session, call.arguments)?
    };

    session.heap_mut().put(call.result, returned);
    Ok(())
}

fn get_index(
    session: &mut Session,
    object: &HeapHandle,
    index: &OpaqueKey,
    result: HeapHandle,
) -> Result<()> {
    let value = session.heap().get(object)?.get_index(index)?;
    session.heap_mut().put(result, HeapObject::Value(value));
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use crate::identifiers::ObservableId;
    use crate::protocol::{CallArguments, Outbound};
    use crate::script::{NativeEngine, NativeFn};

    type Calls = Arc<Mutex<Vec<Vec<Value>>>>;

    struct Fixture {
        dispatcher: Dispatcher,
        session: Session,
        rx: UnboundedReceiver<String>,
        calls: Calls,
    }

    impl Fixture {
        fn new() -> Self {
            let calls = Calls::default();
            let recorded = Arc::clone(&calls);
            let engine = NativeEngine::new()
                .with_function(
                    "record",
                    NativeFn::new("record", move |_s, args| {
                        recorded.lock().push(args.into_values());
                        Ok(Value::Null)
                    })
                    .into_ref(),
                )
                .with_function(
                    "explode",
                    NativeFn::new("explode", |_s, _a| Err(Error::script("kaboom"))).into_ref(),
                );

            let (tx, rx) = mpsc::unbounded_channel();
            let mut session = Session::new();
            session.attach(tx);

            Self {
                dispatcher: Dispatcher::new(engine),
                session,
                rx,
                calls,
            }
        }

        fn text(&mut self, text: &str) {
            self.dispatcher
                .dispatch_text(&mut self.session, text)
                .expect("no fatal error");
        }

        fn send(&mut self, envelope: Value) {
            self.text(&envelope.to_string());
        }

        fn sent(&mut self) -> Vec<Outbound> {
            let mut out = Vec::new();
            while let Ok(text) = self.rx.try_recv() {
                out.push(codec::decode_outbound(&text).expect("valid outbound"));
            }
            out
        }

        fn put_function(&mut self, handle: &str, function: NativeFn) {
            self.session
                .heap_mut()
                .put(HeapHandle::from(handle), function.into_ref());
        }
    }

    fn sum() -> NativeFn {
        NativeFn::new("sum", |_s, args| {
            let total: i64 = args.into_values().iter().filter_map(Value::as_i64).sum();
            Ok(json!(total))
        })
    }

    #[test]
    fn test_update_observable_creates_and_notifies() {
        let mut fx = Fixture::new();
        fx.send(json!({"type": "1", "id": "x", "payload": "record"}));
        fx.send(json!({"type": "0", "id": "x", "payload": 6}));

        assert_eq!(fx.session.get(&ObservableId::from("x")).expect("x"), &json!(6));
        assert_eq!(*fx.calls.lock(), [vec![json!(6)]]);
        assert!(fx.sent().is_empty());
    }

    #[test]
    fn test_unrecognized_type() {
        let mut fx = Fixture::new();
        fx.send(json!({"type": "99", "id": "x", "payload": 1}));

        assert_eq!(
            fx.sent(),
            [Outbound::error("Unrecognized message type: 99.", "")]
        );
        assert!(fx.session.observables().is_empty());
        assert!(fx.session.heap().is_empty());
    }

    #[test]
    fn test_undecodable_frame() {
        let mut fx = Fixture::new();
        fx.text("{not json");

        let sent = fx.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            &sent[0],
            Outbound::Error { message, .. } if message == "Error while decoding message from remote."
        ));
    }

    #[test]
    fn test_onjs_callback_unknown_source() {
        let mut fx = Fixture::new();
        fx.send(json!({"type": "1", "id": "x", "payload": "nope"}));

        let sent = fx.sent();
        assert_eq!(sent.len(), 1);
        let Outbound::Error { message, exception } = &sent[0] else {
            panic!("expected error");
        };
        assert_eq!(
            message,
            "Error while registering an onjs callback.\nonjs function source:\nnope"
        );
        assert_eq!(exception, "Script error: nope is not defined");
        assert!(fx.session.callbacks().is_empty());
    }

    #[test]
    fn test_eval() {
        let mut fx = Fixture::new();
        fx.send(json!({"type": "2", "payload": "record(1, \"two\")"}));
        assert_eq!(*fx.calls.lock(), [vec![json!(1), json!("two")]]);
        assert!(fx.sent().is_empty());
    }

    #[test]
    fn test_eval_fault_includes_source() {
        let mut fx = Fixture::new();
        fx.send(json!({"type": "2", "payload": "explode()"}));

        let sent = fx.sent();
        assert_eq!(sent.len(), 1);
        let Outbound::Error { message, exception } = &sent[0] else {
            panic!("expected error");
        };
        assert!(message.ends_with("Source:\nexplode()"));
        assert!(exception.contains("kaboom"));
    }

    #[test]
    fn test_js_call_positional() {
        let mut fx = Fixture::new();
        let seen = Calls::default();
        let recorded = Arc::clone(&seen);
        fx.put_function(
            "f",
            NativeFn::new("f", move |_s, args| {
                recorded.lock().push(args.clone().into_values());
                Ok(json!(args.len()))
            }),
        );

        fx.send(json!({
            "type": "5", "func": "f", "arguments": [1, 2], "needs_new": false, "result": "r"
        }));

        assert_eq!(*seen.lock(), [vec![json!(1), json!(2)]]);
        let stored = fx.session.heap().get(&HeapHandle::from("r")).expect("result");
        assert_eq!(stored.as_value(), Some(&json!(2)));
        assert!(fx.sent().is_empty());
    }

    #[test]
    fn test_js_call_keyed_passes_single_argument() {
        let mut fx = Fixture::new();
        let seen = Arc::new(Mutex::new(None));
        let recorded = Arc::clone(&seen);
        fx.put_function(
            "f",
            NativeFn::new("f", move |_s, args| {
                *recorded.lock() = Some(args);
                Ok(Value::Null)
            }),
        );

        fx.send(json!({"type": "5", "func": "f", "arguments": {"a": 1}, "result": 1}));

        let args = seen.lock().take().expect("called");
        assert!(matches!(args, CallArguments::Keyed(_)));
        assert_eq!(args.into_values(), vec![json!({"a": 1})]);
    }

    #[test]
    fn test_js_call_empty_arguments() {
        let mut fx = Fixture::new();
        fx.put_function("s", sum());
        fx.send(json!({"type": "5", "func": "s", "arguments": [], "result": "r"}));

        let stored = fx.session.heap().get(&HeapHandle::from("r")).expect("result");
        assert_eq!(stored.as_value(), Some(&json!(0)));
    }

    #[test]
    fn test_js_call_needs_new() {
        let mut fx = Fixture::new();
        fx.put_function(
            "Point",
            NativeFn::new("Point", |_s, _a| Ok(json!("called")))
                .with_constructor(|_s, args| Ok(json!({"x": args.get(0)}))),
        );

        fx.send(json!({"type": "5", "func": "Point", "arguments": [3], "needs_new": true, "result": "p"}));

        let stored = fx.session.heap().get(&HeapHandle::from("p")).expect("result");
        assert_eq!(stored.as_value(), Some(&json!({"x": 3})));
    }

    #[test]
    fn test_js_call_unknown_handle() {
        let mut fx = Fixture::new();
        fx.send(json!({"type": "5", "func": 404, "arguments": [], "result": "r"}));

        let sent = fx.sent();
        assert_eq!(sent.len(), 1);
        let Outbound::Error { message, exception } = &sent[0] else {
            panic!("expected error");
        };
        assert_eq!(
            message,
            "Error while calling function from remote. Function handle: 404"
        );
        assert_eq!(exception, "Can't find heap object with handle: 404");
        assert!(!fx.session.heap().contains(&HeapHandle::from("r")));
    }

    #[test]
    fn test_js_call_not_callable() {
        let mut fx = Fixture::new();
        fx.session.heap_mut().put(HeapHandle::from("v"), json!(1));
        fx.send(json!({"type": "5", "func": "v", "result": "r"}));

        assert_eq!(fx.sent().len(), 1);
        assert!(!fx.session.heap().contains(&HeapHandle::from("r")));
    }

    #[test]
    fn test_js_call_result_is_callable_later() {
        let mut fx = Fixture::new();
        let factory: crate::script::FunctionRef = {
            struct Factory;
            impl crate::script::NativeFunction for Factory {
                fn call(&self, _s: &mut Session, _a: CallArguments) -> Result<HeapObject> {
                    Ok(HeapObject::Function(sum().into_ref()))
                }
                fn source(&self) -> &str {
                    "factory"
                }
            }
            Arc::new(Factory)
        };
        fx.session.heap_mut().put(HeapHandle::from("factory"), factory);

        fx.send(json!({"type": "5", "func": "factory", "result": "adder"}));
        fx.send(json!({"type": "5", "func": "adder", "arguments": [2, 5], "result": "total"}));

        let total = fx.session.heap().get(&HeapHandle::from("total")).expect("total");
        assert_eq!(total.as_value(), Some(&json!(7)));
    }

    #[test]
    fn test_get_and_set_index() {
        let mut fx = Fixture::new();
        fx.session.heap_mut().put(HeapHandle::from("obj"), json!({"a": [1, 2]}));

        fx.send(json!({"type": "7", "object": "obj", "index": "b", "value": true}));
        fx.send(json!({"type": "6", "object": "obj", "index": "a", "result": "arr"}));
        fx.send(json!({"type": "6", "object": "arr", "index": 1, "result": "second"}));

        let second = fx.session.heap().get(&HeapHandle::from("second")).expect("second");
        assert_eq!(second.as_value(), Some(&json!(2)));
        let obj = fx.session.heap().get(&HeapHandle::from("obj")).expect("obj");
        assert_eq!(obj.as_value(), Some(&json!({"a": [1, 2], "b": true})));
        assert!(fx.sent().is_empty());
    }

    #[test]
    fn test_set_index_far_past_end_is_reported() {
        let mut fx = Fixture::new();
        fx.session.heap_mut().put(HeapHandle::from("arr"), json!([]));

        fx.send(json!({"type": "7", "object": "arr", "index": i64::MAX, "value": 1}));
        fx.send(json!({"type": "7", "object": "arr", "index": 10_000_000_000_i64, "value": 1}));

        let sent = fx.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(Outbound::is_error));
        let arr = fx.session.heap().get(&HeapHandle::from("arr")).expect("arr");
        assert_eq!(arr.as_value(), Some(&json!([])));
    }

    #[test]
    fn test_index_on_missing_object() {
        let mut fx = Fixture::new();
        fx.send(json!({"type": "6", "object": "ghost", "index": 0, "result": "r"}));
        fx.send(json!({"type": "7", "object": "ghost", "index": 0, "value": 1}));

        let sent = fx.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(Outbound::is_error));
    }

    #[test]
    fn test_release_handle() {
        let mut fx = Fixture::new();
        fx.session.heap_mut().put(HeapHandle::from(1_i64), json!("x"));

        fx.send(json!({"type": "8", "handle": 1}));
        assert!(fx.session.heap().is_empty());
        assert!(fx.sent().is_empty());

        fx.send(json!({"type": "8", "handle": 1}));
        let sent = fx.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].is_warning());
    }

    #[test]
    fn test_fault_does_not_block_next_envelope() {
        let mut fx = Fixture::new();
        fx.send(json!({"type": "2", "payload": "explode()"}));
        fx.send(json!({"type": "0", "id": "after", "payload": 1}));

        assert_eq!(fx.sent().len(), 1);
        assert_eq!(fx.session.get(&ObservableId::from("after")).expect("after"), &json!(1));
    }

    #[test]
    fn test_detached_session_is_fatal() {
        let mut fx = Fixture::new();
        fx.session.detach();
        let err = fx
            .dispatcher
            .dispatch_text(&mut fx.session, r#"{"type":"99"}"#)
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
