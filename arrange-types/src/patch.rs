//! Partial updates ("patches") exchanged between peers.
//!
//! A patch is a JSON object holding only the fields that changed, keyed by the
//! camelCase field name of the target entity. Patches merge shallowly: a later
//! value for a key replaces the earlier one wholesale.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Field name → new value.
pub type Patch = Map<String, Value>;

/// Shallow merge: `{...into, ...incoming}`.
pub fn merge_patch(into: &mut Patch, incoming: Patch) {
    for (key, value) in incoming {
        into.insert(key, value);
    }
}

/// Apply `patch` to a copy of `target` and return the result.
///
/// Keys listed in `protected` (identity fields) are ignored. Returns `None`
/// when the patched value no longer deserializes into `T` (wrong field type,
/// unknown enum tag), so malformed updates never reach the state.
pub fn apply_patch<T>(target: &T, patch: &Patch, protected: &[&str]) -> Option<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut value = serde_json::to_value(target).ok()?;
    let object = value.as_object_mut()?;
    for (key, field) in patch {
        if protected.contains(&key.as_str()) {
            continue;
        }
        object.insert(key.clone(), field.clone());
    }
    serde_json::from_value(value).ok()
}

/// Build a patch from a serializable value. Non-object values yield an empty patch.
pub fn to_patch<T: Serialize>(value: &T) -> Patch {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Patch::new(),
    }
}
