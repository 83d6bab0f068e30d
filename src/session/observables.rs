//! Observable store.
//!
//! Holds the current value of every known observable. Updates are
//! last-write-wins with no versioning.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::ObservableId;

/// Observable id to current value mapping.
#[derive(Debug, Default)]
pub struct ObservableStore {
    values: FxHashMap<ObservableId, Value>,
}

impl ObservableStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObservableNotFound`] if `id` is not registered.
    pub fn get(&self, id: &ObservableId) -> Result<&Value> {
        self.values
            .get(id)
            .ok_or_else(|| Error::observable_not_found(id.clone()))
    }

    /// Sets `id` to `value`, creating it if needed. Returns the old value.
    pub fn set(&mut self, id: ObservableId, value: Value) -> Option<Value> {
        self.values.insert(id, value)
    }

    /// Returns `true` if `id` is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &ObservableId) -> bool {
        self.values.contains_key(id)
    }

    /// Discards `id`, returning its last value.
    pub fn remove(&mut self, id: &ObservableId) -> Option<Value> {
        self.values.remove(id)
    }

    /// Iterates over registered ids.
    pub fn ids(&self) -> impl Iterator<Item = &ObservableId> {
        self.values.keys()
    }

    /// Returns the number of observables.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no observable is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_get_missing() {
        let store = ObservableStore::new();
        let err = store.get(&ObservableId::from("x")).unwrap_err();
        assert!(matches!(err, Error::ObservableNotFound { .. }));
    }

    #[test]
    fn test_set_get_remove() {
        let mut store = ObservableStore::new();
        assert!(store.set(ObservableId::from("x"), json!(1)).is_none());
        assert_eq!(store.set(ObservableId::from("x"), json!(2)), Some(json!(1)));
        assert_eq!(store.get(&ObservableId::from("x")).expect("x"), &json!(2));
        assert_eq!(store.remove(&ObservableId::from("x")), Some(json!(2)));
        assert!(!store.contains(&ObservableId::from("x")));
    }

    #[test]
    fn test_integer_and_string_id_share_entry() {
        let mut store = ObservableStore::new();
        store.set(ObservableId::from(5_i64), json!("a"));
        store.set(ObservableId::from("5"), json!("b"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&ObservableId::from(5_i64)).expect("5"), &json!("b"));
    }

    proptest! {
        #[test]
        fn prop_last_write_wins(writes in proptest::collection::vec((0i64..4, any::<i32>()), 1..40)) {
            let mut store = ObservableStore::new();
            let mut expected = FxHashMap::default();
            for (id, value) in &writes {
                store.set(ObservableId::from(*id), json!(value));
                expected.insert(*id, *value);
            }
            prop_assert_eq!(store.len(), expected.len());
            for (id, value) in expected {
                prop_assert_eq!(store.get(&ObservableId::from(id)).expect("present"), &json!(value));
            }
        }
    }
}
