//! Deep merge of partial updates into full channel values.
//!
//! Objects merge key by key, everything else (arrays included) replaces the
//! base value. A key missing from the patch leaves the base untouched, so a
//! patch can never delete a key. `null` is a value like any other and
//! replaces.
//!
//! The feed updates single array members with objects keyed by decimal
//! index (`{"Stints": {"1": {"TotalLaps": 12}}}`). Such a patch over an
//! array merges the addressed elements and appends past the end. Any other
//! object over a non-object base starts from an empty object.

use serde_json::{Map, Value};

/// Merges `patch` into `base` and returns the result. Both are taken by value
/// so the result shares nothing with a patch the caller might reuse.
pub fn merge(mut base: Value, patch: Value) -> Value {
    merge_into(&mut base, patch);
    base
}

fn merge_into(base: &mut Value, patch: Value) {
    let patch = match patch {
        Value::Object(patch) => patch,
        other => {
            *base = other;
            return;
        }
    };

    if let Value::Array(items) = base {
        if is_index_patch(&patch) {
            merge_indexed(items, patch);
            return;
        }
    }

    if !base.is_object() {
        *base = Value::Object(Map::new());
    }

    if let Value::Object(map) = base {
        for (key, value) in patch {
            merge_into(map.entry(key).or_insert(Value::Null), value);
        }
    }
}

fn is_index_patch(patch: &Map<String, Value>) -> bool {
    !patch.is_empty() && patch.keys().all(|k| k.parse::<usize>().is_ok())
}

fn merge_indexed(items: &mut Vec<Value>, patch: Map<String, Value>) {
    let mut indexed = patch
        .into_iter()
        .filter_map(|(k, v)| Some((k.parse::<usize>().ok()?, v)))
        .collect::<Vec<_>>();
    indexed.sort_by_key(|(index, _)| *index);

    for (index, value) in indexed {
        match items.get_mut(index) {
            Some(item) => merge_into(item, value),
            None => items.push(merge(Value::Null, value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_patch_is_identity() {
        let base = json!({ "a": 1, "b": { "c": [1, 2], "d": null } });
        assert_eq!(merge(base.clone(), json!({})), base);
    }

    #[test]
    fn test_missing_key_is_preserved() {
        let merged = merge(json!({ "k": "v", "n": { "x": 1 } }), json!({ "n": {} }));
        assert_eq!(merged, json!({ "k": "v", "n": { "x": 1 } }));
    }

    #[test]
    fn test_arrays_replace_wholesale() {
        let merged = merge(json!({ "a": [1, 2, 3] }), json!({ "a": [9] }));
        assert_eq!(merged, json!({ "a": [9] }));
    }

    #[test]
    fn test_nested_objects_merge() {
        let merged = merge(
            json!({ "TrackStatus": { "Status": "1", "Message": "AllClear" } }),
            json!({ "TrackStatus": { "Status": "2" } }),
        );
        assert_eq!(
            merged,
            json!({ "TrackStatus": { "Status": "2", "Message": "AllClear" } })
        );
    }

    #[test]
    fn test_null_and_primitives_replace() {
        let merged = merge(json!({ "a": { "b": 1 }, "c": 2 }), json!({ "a": null, "c": "x" }));
        assert_eq!(merged, json!({ "a": null, "c": "x" }));
    }

    #[test]
    fn test_object_over_primitive_starts_empty() {
        let merged = merge(json!({ "a": 5 }), json!({ "a": { "b": { "c": 1 } } }));
        assert_eq!(merged, json!({ "a": { "b": { "c": 1 } } }));
        assert_eq!(merge(Value::Null, json!({ "x": 1 })), json!({ "x": 1 }));
    }

    #[test]
    fn test_index_patch_updates_array_members() {
        let base = json!({ "Stints": [{ "Compound": "SOFT", "TotalLaps": 3 }] });
        let merged = merge(
            base,
            json!({ "Stints": { "0": { "TotalLaps": 4 }, "1": { "Compound": "HARD" } } }),
        );
        assert_eq!(
            merged,
            json!({ "Stints": [
                { "Compound": "SOFT", "TotalLaps": 4 },
                { "Compound": "HARD" }
            ] })
        );
    }

    #[test]
    fn test_index_patch_applies_in_numeric_order() {
        let merged = merge(json!([]), json!({ "10": "b", "2": "a" }));
        assert_eq!(merged, json!(["a", "b"]));
    }

    #[test]
    fn test_named_keys_over_array_start_empty() {
        let merged = merge(json!({ "a": [1, 2] }), json!({ "a": { "x": 1 } }));
        assert_eq!(merged, json!({ "a": { "x": 1 } }));
    }

    #[test]
    fn test_patch_is_not_aliased() {
        let mut patch = json!({ "a": { "b": 1 } });
        let merged = merge(json!({}), patch.clone());
        patch["a"]["b"] = json!(2);
        assert_eq!(merged, json!({ "a": { "b": 1 } }));
    }
}
