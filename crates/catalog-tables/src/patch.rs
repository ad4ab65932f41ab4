//! JSON merge patch (RFC 7386) over serialized entities.
//!
//! An object in the patch is merged key by key, `null` removes a key, and
//! any other value (arrays included) replaces the target wholesale.

use serde_json::{Map, Value};

pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(target) = target else {
        return;
    };

    for (key, value) in patch {
        if value.is_null() {
            target.remove(key);
        } else {
            apply_merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
        }
    }
}
