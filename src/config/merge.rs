//! Right-biased deep merge of configuration trees.
//!
//! Objects compose key by key. Every other value (scalars, `null`, arrays)
//! from the later document replaces the earlier one wholesale.

use serde_json::{Map, Value};

/// Merges `source` over `target` and returns the combined tree.
pub fn merge(mut target: Map<String, Value>, source: Map<String, Value>) -> Map<String, Value> {
    deep_merge(&mut target, source);
    target
}

/// In-place form of [`merge`].
pub fn deep_merge(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Object(base_map)), Value::Object(overlay_map)) => {
                deep_merge(base_map, overlay_map);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_nested_objects_compose() {
        let merged = merge(
            object(json!({"db": {"host": "localhost", "port": 5432}})),
            object(json!({"db": {"host": "db.internal"}})),
        );
        assert_eq!(
            Value::Object(merged),
            json!({"db": {"host": "db.internal", "port": 5432}})
        );
    }

    #[test]
    fn test_arrays_are_replaced() {
        let merged = merge(object(json!({"list": [1, 2]})), object(json!({"list": [3]})));
        assert_eq!(Value::Object(merged), json!({"list": [3]}));
    }

    #[test]
    fn test_scalar_replaces_object_and_back() {
        let merged = merge(
            object(json!({"a": {"x": 1}, "b": 2})),
            object(json!({"a": "flat", "b": {"y": 3}})),
        );
        assert_eq!(Value::Object(merged), json!({"a": "flat", "b": {"y": 3}}));
    }

    #[test]
    fn test_null_overwrites() {
        let merged = merge(object(json!({"a": 1})), object(json!({"a": null})));
        assert_eq!(Value::Object(merged), json!({"a": null}));
    }

    #[test]
    fn test_target_only_keys_preserved() {
        let merged = merge(
            object(json!({"port": 8080, "debug": false})),
            object(json!({"debug": true})),
        );
        assert_eq!(Value::Object(merged), json!({"port": 8080, "debug": true}));
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,4}".prop_map(Value::String),
        ]
    }

    fn tree() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
                prop::collection::btree_map("[a-c]", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn document() -> impl Strategy<Value = Map<String, Value>> {
        prop::collection::btree_map("[a-c]", tree(), 0..4).prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_merge_is_right_biased(a in document(), b in document()) {
            let merged = merge(a.clone(), b.clone());

            for key in a.keys().chain(b.keys()) {
                let expected = match (a.get(key), b.get(key)) {
                    (Some(Value::Object(left)), Some(Value::Object(right))) => {
                        Value::Object(merge(left.clone(), right.clone()))
                    }
                    (_, Some(right)) => right.clone(),
                    (Some(left), None) => left.clone(),
                    (None, None) => unreachable!(),
                };
                prop_assert_eq!(merged.get(key), Some(&expected));
            }
            prop_assert!(merged.keys().all(|k| a.contains_key(k) || b.contains_key(k)));
        }
    }
}
