//! Update descriptions and the copy-on-write update engine.

use crate::error::{Result, StoreError};
use crate::value::{State, Value};

/// Draft function: mutates a copy-on-write draft of the current state.
/// Returning `Some(value)` supersedes the draft's mutations entirely.
pub type DraftFn = Box<dyn FnOnce(&mut Value) -> Option<Value> + Send>;

/// Describes a state transition. Exactly one of two forms per update:
/// a partial map merged shallowly into the current state, or a draft
/// function applied to a copy-on-write draft.
pub enum Update {
    /// Shallow merge of a map into the current state.
    Merge(Value),
    /// Draft function, see [`DraftFn`].
    With(DraftFn),
}

impl Update {
    /// Shallow-merge update. The value must be a map; anything else is
    /// rejected by the engine with [`StoreError::InvalidUpdate`].
    pub fn merge(patch: impl Into<Value>) -> Self {
        Update::Merge(patch.into())
    }

    /// Draft-function update. The function may mutate the draft in place
    /// and/or return a replacement; a returned value wins over mutations.
    pub fn with(f: impl FnOnce(&mut Value) -> Option<Value> + Send + 'static) -> Self {
        Update::With(Box::new(f))
    }

    /// Draft-function update that only mutates, never replaces.
    pub fn mutate(f: impl FnOnce(&mut Value) + Send + 'static) -> Self {
        Update::With(Box::new(move |draft| {
            f(draft);
            None
        }))
    }

    /// Replace the entire state. Sugar over the function form.
    pub fn replace(state: impl Into<Value>) -> Self {
        let state = state.into();
        Update::With(Box::new(move |_| Some(state)))
    }
}

/// Apply an update to the current state, producing the candidate next state.
///
/// The current state is never touched: merges copy the top-level map before
/// inserting, and draft mutations go through `Arc::make_mut`, which clones
/// only the paths the draft actually writes. Untouched siblings keep their
/// old allocation.
pub fn apply(current: &State, update: Update) -> Result<State> {
    match update {
        Update::Merge(patch) => {
            let fields = match patch {
                Value::Map(fields) => fields,
                other => {
                    return Err(StoreError::InvalidUpdate(format!(
                        "merge expects a map, got {}",
                        other.type_name()
                    )))
                }
            };
            let mut next = current.clone();
            let map = next
                .as_map_mut()
                .ok_or_else(|| StoreError::InvalidUpdate("state is not a map".to_string()))?;
            for (key, value) in fields.iter() {
                map.insert(key.clone(), value.clone());
            }
            Ok(next)
        }
        Update::With(f) => {
            let mut draft = current.clone();
            let next = match f(&mut draft) {
                Some(replacement) => replacement,
                None => draft,
            };
            if !matches!(next, Value::Map(_)) {
                return Err(StoreError::InvalidUpdate(format!(
                    "update produced {}, expected a map",
                    next.type_name()
                )));
            }
            Ok(next)
        }
    }
}
