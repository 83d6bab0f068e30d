//! Script engines.
//!
//! A [`ScriptEngine`] is the capability boundary between code strings sent
//! by the remote side and local execution. [`NativeEngine`] is a restricted
//! command language: source can only name functions the host registered.
//!
//! # Grammar
//!
//! ```text
//! source := name | name "(" json-values ")"
//! name   := [A-Za-z_$][A-Za-z0-9_$.]*
//! ```
//!
//! `compile` accepts a bare `name`. `eval` accepts both forms; the JSON
//! values inside the parentheses become positional arguments.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::CallArguments;
use crate::session::Session;

use super::FunctionRef;

// ============================================================================
// ScriptEngine
// ============================================================================

/// Turns remote code strings into local behavior.
pub trait ScriptEngine: Send {
    /// Compiles `source` into a callable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Script`] if the source does not denote a callable.
    fn compile(&self, source: &str) -> Result<FunctionRef>;

    /// Evaluates `source` for its side effects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Script`] if the source is invalid, or whatever the
    /// evaluated code fails with.
    fn eval(&self, session: &mut Session, source: &str) -> Result<()>;
}

// ============================================================================
// NativeEngine
// ============================================================================

/// Engine resolving names against host-registered functions.
///
/// # Example
///
/// ```ignore
/// use jscall::script::{NativeEngine, NativeFn};
///
/// let engine = NativeEngine::new().with_function(
///     "log_value",
///     NativeFn::new("log_value", |_s, args| {
///         println!("{:?}", args.get(0));
///         Ok(serde_json::Value::Null)
///     })
///     .into_ref(),
/// );
/// ```
#[derive(Default)]
pub struct NativeEngine {
    functions: FxHashMap<String, FunctionRef>,
}

impl NativeEngine {
    /// Creates an engine with no functions.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, function: FunctionRef) {
        let name = name.into();
        debug!(name = %name, "Registered native function");
        self.functions.insert(name, function);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with_function(mut self, name: impl Into<String>, function: FunctionRef) -> Self {
        self.register(name, function);
        self
    }

    /// Looks up a registered function.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<FunctionRef> {
        self.functions.get(name).cloned()
    }

    /// Returns the number of registered functions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns `true` if no function is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    fn resolve(&self, name: &str) -> Result<FunctionRef> {
        self.function(name)
            .ok_or_else(|| Error::script(format!("{name} is not defined")))
    }
}

impl ScriptEngine for NativeEngine {
    fn compile(&self, source: &str) -> Result<FunctionRef> {
        let command = Command::parse(source)?;
        if command.args.is_some() {
            return Err(Error::script(format!(
                "expected a function name, got a call: {}",
                source.trim()
            )));
        }
        self.resolve(command.name)
    }

    fn eval(&self, session: &mut Session, source: &str) -> Result<()> {
        if source.trim().is_empty() {
            return Ok(());
        }

        let command = Command::parse(source)?;
        let function = self.resolve(command.name)?;
        let args = CallArguments::Positional(command.args.unwrap_or_default());

        trace!(name = command.name, argc = args.len(), "Evaluating command");
        function.call(session, args)?;
        Ok(())
    }
}

impl fmt::Debug for NativeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("NativeEngine")
            .field("functions", &names)
            .finish()
    }
}

// ============================================================================
// Command
// ============================================================================

/// A parsed `name` or `name(args)` source string.
#[derive(Debug, PartialEq)]
struct Command<'a> {
    name: &'a str,
    args: Option<Vec<Value>>,
}

impl<'a> Command<'a> {
    fn parse(source: &'a str) -> Result<Self> {
        let source = source.trim().trim_end_matches(';').trim_end();

        let (name, args) = match source.find('(') {
            Some(open) => {
                let inner = source[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| Error::script(format!("unbalanced call: {source}")))?;
                let args: Vec<Value> = serde_json::from_str(&format!("[{inner}]"))
                    .map_err(|e| Error::script(format!("invalid arguments in {source}: {e}")))?;
                (source[..open].trim_end(), Some(args))
            }
            None => (source, None),
        };

        if !is_identifier(name) {
            return Err(Error::script(format!("invalid function name: {name:?}")));
        }

        Ok(Self { name, args })
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'))
}

// ============================================================================
// Tests
// ============================================================================
