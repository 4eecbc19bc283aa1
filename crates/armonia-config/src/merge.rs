//! Host configuration merging.
//!
//! The host bundler merges configuration fragments with its own rules, which
//! differ from a plain "last write wins" overlay:
//!
//! - objects merge key by key, recursively
//! - arrays concatenate (a scalar next to an array is treated as a one-element array)
//! - `null` in the override never clears an existing value
//! - any other value replaces the existing one

use serde_json::Value;

/// Merge `overrides` into `base` in place.
pub fn merge_config(base: &mut Value, overrides: &Value) {
    let Value::Object(update_map) = overrides else {
        if !overrides.is_null() {
            *base = overrides.clone();
        }
        return;
    };

    if !base.is_object() {
        *base = Value::Object(serde_json::Map::with_capacity(update_map.len()));
    }

    let Value::Object(target_map) = base else {
        return;
    };

    for (key, value) in update_map {
        if value.is_null() {
            continue;
        }

        match target_map.get_mut(key) {
            None | Some(Value::Null) => {
                target_map.insert(key.clone(), value.clone());
            }
            Some(existing) => merge_value(existing, value),
        }
    }
}

/// Merge two fragments and return the result, leaving the inputs untouched.
pub fn merged(base: &Value, overrides: &Value) -> Value {
    let mut out = base.clone();
    merge_config(&mut out, overrides);
    out
}

fn merge_value(existing: &mut Value, value: &Value) {
    match (&mut *existing, value) {
        (Value::Array(items), Value::Array(extra)) => items.extend(extra.iter().cloned()),
        (Value::Array(items), scalar) => items.push(scalar.clone()),
        (current, Value::Array(extra)) => {
            let mut items = Vec::with_capacity(extra.len() + 1);
            items.push(current.take());
            items.extend(extra.iter().cloned());
            *current = Value::Array(items);
        }
        (Value::Object(_), Value::Object(_)) => merge_config(existing, value),
        (current, other) => *current = other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn objects_merge_recursively() {
        let mut base = json!({ "build": { "minify": true, "outDir": "dist" } });
        merge_config(&mut base, &json!({ "build": { "minify": false } }));
        assert_eq!(base, json!({ "build": { "minify": false, "outDir": "dist" } }));
    }

    #[test]
    fn null_never_clears() {
        let mut base = json!({ "publicDir": "public" });
        merge_config(&mut base, &json!({ "publicDir": null }));
        assert_eq!(base, json!({ "publicDir": "public" }));
    }

    #[test]
    fn arrays_concatenate() {
        let mut base = json!({ "external": ["a"] });
        merge_config(&mut base, &json!({ "external": ["b", "c"] }));
        assert_eq!(base, json!({ "external": ["a", "b", "c"] }));

        let mut scalar = json!({ "external": "a" });
        merge_config(&mut scalar, &json!({ "external": ["b"] }));
        assert_eq!(scalar, json!({ "external": ["a", "b"] }));
    }

    #[test]
    fn scalars_replace() {
        let mut base = json!({ "publicDir": "public", "build": { "emptyOutDir": true } });
        merge_config(
            &mut base,
            &json!({ "publicDir": false, "build": { "emptyOutDir": false } }),
        );
        assert_eq!(
            base,
            json!({ "publicDir": false, "build": { "emptyOutDir": false } })
        );
    }

    #[test]
    fn merged_leaves_inputs_untouched() {
        let base = json!({ "a": 1 });
        let out = merged(&base, &json!({ "b": 2 }));
        assert_eq!(base, json!({ "a": 1 }));
        assert_eq!(out, json!({ "a": 1, "b": 2 }));
    }
}
