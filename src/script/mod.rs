//! Remote code execution behind a capability boundary.
//!
//! The remote side sends code strings (`OnjsCallback`, `EvalJavascript`).
//! They never run as arbitrary code: a [`ScriptEngine`] decides what a
//! string means. The bundled [`NativeEngine`] only resolves names of
//! functions the host registered, so the remote side is trusted exactly as
//! far as those functions allow.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `engine` | [`ScriptEngine`] trait and [`NativeEngine`] |
//! | `function` | [`NativeFunction`] trait and [`NativeFn`] |

// ============================================================================
// Submodules
// ============================================================================

/// Script engines.
pub mod engine;

/// Callable objects.
pub mod function;

// ============================================================================
// Re-exports
// ============================================================================

pub use engine::{NativeEngine, ScriptEngine};
pub use function::{CallFn, FunctionRef, NativeFn, NativeFunction};
