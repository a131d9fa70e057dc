//! Property tests: configuration merging and parameter flattening

use myautoml::config::recursive_update;
use myautoml::optimizer::{flatten_params, prep_params, ParamMap, ParamTree, ParamValue};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeMap;

fn object(map: &BTreeMap<String, i64>) -> Value {
    serde_json::to_value(map).unwrap()
}

proptest! {
    #[test]
    fn prop_update_wins_and_base_keys_survive(
        base in prop::collection::btree_map("[a-f]", any::<i64>(), 0..6),
        update in prop::collection::btree_map("[a-f]", any::<i64>(), 0..6),
    ) {
        let mut merged = object(&base);
        recursive_update(&mut merged, &object(&update));

        let merged = merged.as_object().unwrap();
        for (key, value) in &update {
            prop_assert_eq!(&merged[key], &json!(value));
        }
        for (key, value) in &base {
            if !update.contains_key(key) {
                prop_assert_eq!(&merged[key], &json!(value));
            }
        }
        prop_assert!(merged.len() <= base.len() + update.len());
    }

    #[test]
    fn prop_update_is_idempotent(
        base in prop::collection::btree_map("[a-f]", any::<i64>(), 0..6),
        update in prop::collection::btree_map("[a-f]", any::<i64>(), 0..6),
    ) {
        let mut once = json!({ "training": object(&base) });
        let patch = json!({ "training": object(&update) });
        recursive_update(&mut once, &patch);
        let mut twice = once.clone();
        recursive_update(&mut twice, &patch);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_flatten_keeps_every_disjoint_leaf(
        first in prop::collection::btree_map("[a-e]", any::<i64>(), 0..5),
        second in prop::collection::btree_map("[f-j]", any::<i64>(), 0..5),
    ) {
        let mut tree = ParamTree::group();
        let mut inner = ParamTree::group();
        for (k, v) in &first {
            inner.insert(k.clone(), (*v).into());
        }
        tree.insert("estimator", inner);
        let mut nested = ParamTree::group().with("deep", ParamTree::group());
        for (k, v) in &second {
            nested.insert(k.clone(), (*v).into());
        }
        tree.insert("sampler", nested);

        let flat = flatten_params(&tree);
        prop_assert_eq!(flat.len(), first.len() + second.len());
        for (k, v) in first.iter().chain(second.iter()) {
            prop_assert_eq!(&flat[k], &ParamValue::Int(*v));
        }
    }

    #[test]
    fn prop_prep_turns_whole_floats_into_ints(n in -1_000_000i64..1_000_000) {
        let mut params = ParamMap::new();
        params.insert("whole".to_string(), ParamValue::Float(n as f64));
        params.insert("half".to_string(), ParamValue::Float(n as f64 + 0.5));
        params.insert("name".to_string(), ParamValue::from("gini"));

        let prepped = prep_params(&params);
        prop_assert_eq!(&prepped["whole"], &ParamValue::Int(n));
        prop_assert_eq!(&prepped["half"], &ParamValue::Float(n as f64 + 0.5));
        prop_assert_eq!(&prepped["name"], &ParamValue::from("gini"));
    }
}

#[test]
fn test_nested_update_merges_sections() {
    let mut base = json!({
        "training": { "max_evals": 5, "random_state": 1 },
        "experiment": { "name": "Default" }
    });
    recursive_update(&mut base, &json!({ "training": { "max_evals": 50 } }));
    assert_eq!(base["training"]["max_evals"], 50);
    assert_eq!(base["training"]["random_state"], 1);
    assert_eq!(base["experiment"]["name"], "Default");
}

#[test]
fn test_flatten_collision_keeps_last_group() {
    let tree = ParamTree::group()
        .with("a", ParamTree::group().with("max_depth", 3i64))
        .with("b", ParamTree::group().with("max_depth", 7i64));
    assert_eq!(flatten_params(&tree)["max_depth"], ParamValue::Int(7));
}
