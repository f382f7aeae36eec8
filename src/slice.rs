//! Scoped read/write views over a single state field.

use crate::error::{Result, StoreError};
use crate::store::Store;
use crate::update::Update;
use crate::value::{State, Value};
use std::fmt;

/// Accessor limited to one named field of store state, with at most one
/// further level of nesting. All writes delegate to the store's full update
/// path (middleware runs and listeners fire like any other update) and
/// merge only the addressed field, leaving siblings untouched.
#[derive(Clone)]
pub struct Slice {
    store: Store,
    path: Vec<String>,
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slice").field("path", &self.path).finish()
    }
}

impl Store {
    /// Scoped accessor over a top-level field.
    pub fn slice(&self, field: impl Into<String>) -> Slice {
        Slice {
            store: self.clone(),
            path: vec![field.into()],
        }
    }
}

impl Slice {
    /// Accessor one level deeper. Deeper nesting is unsupported and fails
    /// fast rather than producing incorrect partial updates.
    pub fn slice(&self, field: impl Into<String>) -> Result<Slice> {
        if self.path.len() >= 2 {
            return Err(StoreError::SliceNesting(format!(
                "'{}' is already {} levels deep",
                self.path.join("."),
                self.path.len()
            )));
        }
        let mut path = self.path.clone();
        path.push(field.into());
        Ok(Slice {
            store: self.store.clone(),
            path,
        })
    }

    /// Current value of the addressed field (`Null` when absent).
    pub fn get_slice(&self) -> Value {
        let state = self.store.get_state();
        let mut value = &state;
        for key in &self.path {
            match value.get(key) {
                Some(child) => value = child,
                None => return Value::Null,
            }
        }
        value.clone()
    }

    /// Apply `update` to the addressed field.
    ///
    /// A merge update requires a map patch and merges it shallowly into the
    /// field; if the field's current value is not a map, the patch replaces
    /// it. A draft-function update receives the field's current value; a
    /// returned value replaces the field, mirroring the store-level contract.
    pub fn set_slice(&self, update: Update) -> Result<State> {
        if let Update::Merge(patch) = &update {
            if !matches!(patch, Value::Map(_)) {
                return Err(StoreError::InvalidUpdate(format!(
                    "slice merge expects a map, got {}",
                    patch.type_name()
                )));
            }
        }

        let path = self.path.clone();
        self.store.set_state(Update::with(move |draft| {
            let target = ensure_path(draft, &path);
            match update {
                Update::Merge(patch) => match (target.as_map().is_some(), patch) {
                    (true, Value::Map(fields)) => {
                        if let Some(map) = target.as_map_mut() {
                            for (key, value) in fields.iter() {
                                map.insert(key.clone(), value.clone());
                            }
                        }
                    }
                    (_, patch) => *target = patch,
                },
                Update::With(f) => {
                    if let Some(replacement) = f(target) {
                        *target = replacement;
                    }
                }
            }
            None
        }))
    }

    /// Synchronous selector application against the field's current value.
    pub fn select<R>(&self, selector: impl FnOnce(&Value) -> R) -> R {
        let value = self.get_slice();
        selector(&value)
    }

    /// The field path this slice addresses.
    pub fn path(&self) -> &[String] {
        &self.path
    }
}

/// Walk `path` through the draft, coercing missing or non-map intermediate
/// nodes into maps so the addressed field can be written.
fn ensure_path<'a>(root: &'a mut Value, path: &[String]) -> &'a mut Value {
    let mut current = root;
    for key in path {
        if current.as_map().is_none() {
            *current = Value::empty_map();
        }
        // Coerced to a map just above.
        let map = current.as_map_mut().expect("slice path node is a map");
        current = map.entry(key.clone()).or_insert(Value::Null);
    }
    current
}
