//! Layer merge logic
//!
//! Merges a lower-authority layer with a higher-authority one:
//! - Override: the higher layer's value wins if it is set
//! - ListUnion: concatenate, then keep only the last occurrence of each element
//! - MapUnion: like ListUnion over entries; a re-added key moves to its new position
//! - Custom settings: per key, the higher layer's value (even `null`) wins
//!
//! Merging is associative but not commutative: layers must be folded in
//! authority order.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

use super::descriptor::MergePolicy;
use super::layer::{SettingValue, SettingsLayer};

/// Concatenate and drop all but the last occurrence of each element.
pub fn list_union<T: Eq + Hash + Clone>(lower: &[T], higher: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut merged: Vec<T> = lower
        .iter()
        .chain(higher)
        .rev()
        .filter(|item| seen.insert(*item))
        .cloned()
        .collect();
    merged.reverse();
    merged
}

/// Entries of `higher` replace and move behind the entries of `lower`.
pub fn map_union(
    lower: &IndexMap<String, String>,
    higher: &IndexMap<String, String>,
) -> IndexMap<String, String> {
    let mut merged = lower.clone();
    for (key, value) in higher {
        merged.shift_remove(key);
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Per-key override; keys absent from `higher` keep `lower`'s value.
pub fn custom_union(
    lower: &BTreeMap<String, Value>,
    higher: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    let mut merged = lower.clone();
    merged.extend(higher.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Merge two values of one setting according to `policy`.
pub fn merge_values(policy: MergePolicy, lower: &SettingValue, higher: &SettingValue) -> SettingValue {
    match (policy, lower, higher) {
        (MergePolicy::ListUnion, SettingValue::List(l), SettingValue::List(h)) => {
            SettingValue::List(list_union(l, h))
        }
        (MergePolicy::MapUnion, SettingValue::Map(l), SettingValue::Map(h)) => {
            SettingValue::Map(map_union(l, h))
        }
        _ => higher.clone(),
    }
}

/// Merge two layers into a new one; neither input is modified.
pub fn merge_pair(lower: &SettingsLayer, higher: &SettingsLayer) -> SettingsLayer {
    let mut values: BTreeMap<_, _> = lower.values().map(|(k, v)| (k, v.clone())).collect();
    for (key, value) in higher.values() {
        let merged = match values.get(&key) {
            Some(existing) => merge_values(key.descriptor().policy, existing, value),
            None => value.clone(),
        };
        values.insert(key, merged);
    }
    let custom = custom_union(lower.custom_entries(), higher.custom_entries());
    SettingsLayer::from_parts(values, custom)
}

/// Merge layers in order (first is lowest authority, last is highest).
pub fn merge_layers<'a>(layers: impl IntoIterator<Item = &'a SettingsLayer>) -> SettingsLayer {
    layers
        .into_iter()
        .fold(SettingsLayer::new(), |acc, layer| merge_pair(&acc, layer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettingKey;
    use serde_json::json;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn map(entries: &[(&str, &str)]) -> IndexMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_list_union_keeps_last_occurrence() {
        assert_eq!(
            list_union(&list(&["t1", "t2", "t3"]), &list(&["t2"])),
            list(&["t1", "t3", "t2"])
        );
        assert_eq!(
            list_union(&list(&["a", "b", "a"]), &list(&[])),
            list(&["b", "a"])
        );
    }

    #[test]
    fn test_list_union_associative_not_commutative() {
        let a = list(&["x", "y", "z"]);
        let b = list(&["y", "w"]);
        let c = list(&["x", "q"]);

        assert_eq!(
            list_union(&list_union(&a, &b), &c),
            list_union(&a, &list_union(&b, &c))
        );
        assert_ne!(list_union(&a, &b), list_union(&b, &a));
    }

    #[test]
    fn test_map_union_key_bubbling() {
        let merged = map_union(
            &map(&[("t1", "a.ftl"), ("t2", "b.ftl"), ("t3", "c.ftl")]),
            &map(&[("t2", "b2.ftl")]),
        );
        let keys: Vec<&str> = merged.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["t1", "t3", "t2"]);
        assert_eq!(merged["t2"], "b2.ftl");
    }

    #[test]
    fn test_custom_union_null_wins() {
        let mut lower = BTreeMap::new();
        lower.insert("a".to_string(), json!(1));
        lower.insert("b".to_string(), json!(2));
        let mut higher = BTreeMap::new();
        higher.insert("b".to_string(), Value::Null);
        higher.insert("c".to_string(), json!(3));

        let merged = custom_union(&lower, &higher);
        assert_eq!(merged["a"], json!(1));
        assert_eq!(merged["b"], Value::Null);
        assert_eq!(merged["c"], json!(3));
    }

    #[test]
    fn test_merge_pair_by_policy() {
        let lower = SettingsLayer::new()
            .with(SettingKey::TabSize, SettingValue::Int(8))
            .unwrap()
            .with(SettingKey::AutoInclude, SettingValue::List(list(&["i1", "i2"])))
            .unwrap()
            .with(SettingKey::AutoImport, SettingValue::Map(map(&[("a", "a.ftl"), ("b", "b.ftl")])))
            .unwrap();
        let higher = SettingsLayer::new()
            .with(SettingKey::TabSize, SettingValue::Int(2))
            .unwrap()
            .with(SettingKey::AutoInclude, SettingValue::List(list(&["i1"])))
            .unwrap()
            .with(SettingKey::AutoImport, SettingValue::Map(map(&[("a", "a2.ftl")])))
            .unwrap();

        let merged = merge_pair(&lower, &higher);
        assert_eq!(merged.get(SettingKey::TabSize), Some(&SettingValue::Int(2)));
        assert_eq!(
            merged.get(SettingKey::AutoInclude),
            Some(&SettingValue::List(list(&["i2", "i1"])))
        );
        assert_eq!(
            merged.get(SettingKey::AutoImport),
            Some(&SettingValue::Map(map(&[("b", "b.ftl"), ("a", "a2.ftl")])))
        );

        // inputs untouched
        assert_eq!(lower.get(SettingKey::TabSize), Some(&SettingValue::Int(8)));
    }

    #[test]
    fn test_merge_layers_in_order() {
        let global = SettingsLayer::new()
            .with(SettingKey::AutoInclude, SettingValue::List(list(&["t1", "t2", "t3"])))
            .unwrap();
        let overlay = SettingsLayer::new()
            .with(SettingKey::AutoInclude, SettingValue::List(list(&["t2"])))
            .unwrap();
        let session = SettingsLayer::new()
            .with(SettingKey::AutoInclude, SettingValue::List(list(&["t1"])))
            .unwrap();

        let merged = merge_layers([&global, &overlay, &session]);
        assert_eq!(
            merged.get(SettingKey::AutoInclude),
            Some(&SettingValue::List(list(&["t3", "t2", "t1"])))
        );
    }
}
