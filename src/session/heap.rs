//! Object heap.
//!
//! Maps opaque handles to locally owned objects so the remote side can refer
//! to them without serializing them. Entries live until overwritten or
//! released.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{HeapHandle, OpaqueKey};
use crate::script::FunctionRef;

// ============================================================================
// Constants
// ============================================================================

/// Most `null` slots a single array write may add past the end.
pub const MAX_ARRAY_PADDING: usize = 1024;

// ============================================================================
// HeapObject
// ============================================================================

/// An object stored on the heap.
#[derive(Clone)]
pub enum HeapObject {
    /// Plain data.
    Value(Value),
    /// A callable.
    Function(FunctionRef),
}

impl HeapObject {
    /// Returns the data value, if this is one.
    #[inline]
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Function(_) => None,
        }
    }

    /// Returns the callable, if this is one.
    #[inline]
    #[must_use]
    pub fn as_function(&self) -> Option<&FunctionRef> {
        match self {
            Self::Function(function) => Some(function),
            Self::Value(_) => None,
        }
    }

    /// Returns `true` for exactly the boolean `false`.
    #[inline]
    #[must_use]
    pub fn is_false(&self) -> bool {
        matches!(self, Self::Value(Value::Bool(false)))
    }

    /// Reads `self[index]`.
    ///
    /// Arrays take integer indices, objects take keys (integers are used
    /// by their decimal form). Missing entries read as `null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Script`] if the object cannot be indexed that way.
    pub fn get_index(&self, index: &OpaqueKey) -> Result<Value> {
        match (self, index) {
            (Self::Value(Value::Array(items)), OpaqueKey::Int(i)) => {
                let position = array_position(*i)?;
                Ok(items.get(position).cloned().unwrap_or(Value::Null))
            }
            (Self::Value(Value::Object(map)), key) => {
                Ok(map.get(&key.to_string()).cloned().unwrap_or(Value::Null))
            }
            _ => Err(Error::script(format!(
                "cannot read index {index} of {}",
                self.kind()
            ))),
        }
    }

    /// Writes `self[index] = value`.
    ///
    /// Writing past the end of an array pads it with `null`, by at most
    /// [`MAX_ARRAY_PADDING`] slots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Script`] if the object cannot be indexed that way or
    /// the index is too far past the end.
    pub fn set_index(&mut self, index: &OpaqueKey, value: Value) -> Result<()> {
        let kind = self.kind();
        match (self, index) {
            (Self::Value(Value::Array(items)), OpaqueKey::Int(i)) => {
                let position = array_position(*i)?;
                if position - items.len().min(position) > MAX_ARRAY_PADDING {
                    return Err(Error::script(format!(
                        "array index {position} is too far past length {}",
                        items.len()
                    )));
                }
                if position >= items.len() {
                    items.resize(position + 1, Value::Null);
                }
                items[position] = value;
                Ok(())
            }
            (Self::Value(Value::Object(map)), key) => {
                map.insert(key.to_string(), value);
                Ok(())
            }
            _ => Err(Error::script(format!("cannot write index {index} of {kind}"))),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Value(Value::Null) => "null",
            Self::Value(Value::Bool(_)) => "a boolean",
            Self::Value(Value::Number(_)) => "a number",
            Self::Value(Value::String(_)) => "a string",
            Self::Value(Value::Array(_)) => "an array",
            Self::Value(Value::Object(_)) => "an object",
            Self::Function(_) => "a function",
        }
    }
}

fn array_position(index: i64) -> Result<usize> {
    usize::try_from(index).map_err(|_| Error::script(format!("invalid array index {index}")))
}

impl From<Value> for HeapObject {
    #[inline]
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<FunctionRef> for HeapObject {
    #[inline]
    fn from(function: FunctionRef) -> Self {
        Self::Function(function)
    }
}

impl fmt::Debug for HeapObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Function(function) => f.debug_tuple("Function").field(&function.source()).finish(),
        }
    }
}

// ============================================================================
// ObjectHeap
// ============================================================================

/// Handle to object mapping.
#[derive(Debug, Default)]
pub struct ObjectHeap {
    objects: FxHashMap<HeapHandle, HeapObject>,
}

impl ObjectHeap {
    /// Creates an empty heap.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `object` under `handle`, returning the previous entry.
    pub fn put(&mut self, handle: HeapHandle, object: impl Into<HeapObject>) -> Option<HeapObject> {
        self.objects.insert(handle, object.into())
    }

    /// Looks up `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeapObjectNotFound`] if absent.
    pub fn get(&self, handle: &HeapHandle) -> Result<&HeapObject> {
        self.objects
            .get(handle)
            .ok_or_else(|| Error::heap_object_not_found(handle.clone()))
    }

    /// Looks up `handle` for mutation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeapObjectNotFound`] if absent.
    pub fn get_mut(&mut self, handle: &HeapHandle) -> Result<&mut HeapObject> {
        self.objects
            .get_mut(handle)
            .ok_or_else(|| Error::heap_object_not_found(handle.clone()))
    }

    /// Removes `handle`, returning its object.
    pub fn release(&mut self, handle: &HeapHandle) -> Option<HeapObject> {
        self.objects.remove(handle)
    }

    /// Returns `true` if `handle` is stored.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: &HeapHandle) -> bool {
        self.objects.contains_key(handle)
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if the heap is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
