// tests/delta_tests.rs

mod common;

use common::{critter, critters};
use indexmap::IndexMap;
use plume_query::delta::{CollectionDelta, Delta, DictionaryDelta, ObjectDelta};
use plume_query::error::DeltaError;
use plume_query::{Resource, Value};

fn names(value: &Value) -> Vec<String> {
    value
        .as_items()
        .unwrap_or_default()
        .iter()
        .filter_map(|item| match item {
            Value::Resource(r) => r.get("Name").map(Value::as_string),
            _ => None,
        })
        .collect()
}

fn dictionary(entries: &[(&str, &str)]) -> Value {
    Value::Dictionary(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect::<IndexMap<_, _>>(),
    )
}

// ============================================================================
// Collections
// ============================================================================

#[test]
fn test_remove_by_uri() {
    let mut delta = CollectionDelta::new();
    delta.remove(Resource::new("Critter").with_uri("http://test/critters/1"));
    let updated = Delta::Collection(delta).apply(&Value::Array(critters())).unwrap();
    assert_eq!(names(&updated), vec!["Alice", "Zed"]);
}

#[test]
fn test_modify_by_primary_key() {
    let mut zed = ObjectDelta::new(Resource::new("Critter").with("Id", 3));
    zed.set("Number", 13);
    let mut delta = CollectionDelta::new();
    delta.modify(zed);

    let updated = Delta::Collection(delta).apply(&Value::Array(critters())).unwrap();
    let items = updated.as_items().unwrap();
    let Value::Resource(zed) = &items[2] else {
        panic!("Expected resource");
    };
    assert_eq!(zed.get("Number"), Some(&Value::Integer(13)));
    assert_eq!(zed.get("Name"), Some(&Value::from("Zed")));
}

#[test]
fn test_modified_item_must_exist() {
    let mut delta = CollectionDelta::new();
    delta.modify(ObjectDelta::new(Resource::new("Critter").with("Id", 9)));
    assert_eq!(
        Delta::Collection(delta).apply(&Value::Array(critters())),
        Err(DeltaError::ItemNotFound("{Id=9}".to_string()))
    );
}

#[test]
fn test_remove_after_add_cancels() {
    let neo = Resource::new("Critter").with_uri("http://test/critters/4").with("Id", 4);
    let mut delta = CollectionDelta::new();
    delta.add(neo.clone());
    delta.remove(neo);
    assert!(delta.is_empty());
}

#[test]
fn test_cleared_collection() {
    let mut delta = CollectionDelta::new();
    delta.remove(Resource::new("Critter").with("Id", 1));
    delta.clear();
    assert!(!delta.is_empty());
    assert!(delta.removed.is_empty());

    delta.add(critter(7, "Seven", 7));
    // Removing after a clear has nothing left to remove.
    delta.remove(Resource::new("Critter").with("Id", 2));
    assert!(delta.removed.is_empty());

    let updated = Delta::Collection(delta).apply(&Value::Array(critters())).unwrap();
    assert_eq!(names(&updated), vec!["Seven"]);
}

#[test]
fn test_null_baseline_is_empty_collection() {
    let mut delta = CollectionDelta::new();
    delta.add(critter(1, "Bob", 8));
    let updated = Delta::Collection(delta).apply(&Value::Null).unwrap();
    assert_eq!(names(&updated), vec!["Bob"]);
}

#[test]
fn test_scalar_items_match_by_value() {
    let mut delta = CollectionDelta::new();
    delta.remove("b");
    delta.add("d");
    let baseline = Value::Array(vec![Value::from("a"), Value::from("b"), Value::from("c")]);
    assert_eq!(
        Delta::Collection(delta).apply(&baseline).unwrap(),
        Value::Array(vec![Value::from("a"), Value::from("c"), Value::from("d")])
    );
}

// ============================================================================
// Dictionaries
// ============================================================================

#[test]
fn test_dictionary_insert_and_remove() {
    let mut delta = DictionaryDelta::new();
    delta.insert("color", "red");
    delta.remove("fubu");
    let baseline = dictionary(&[("fubu", "x"), ("size", "L")]);
    assert_eq!(
        Delta::Dictionary(delta).apply(&baseline).unwrap(),
        dictionary(&[("size", "L"), ("color", "red")])
    );
}

#[test]
fn test_dictionary_last_edit_wins() {
    let mut delta = DictionaryDelta::new();
    delta.insert("color", "red");
    delta.remove("color");
    assert!(delta.modified.is_empty());
    assert_eq!(delta.removed, vec!["color".to_string()]);

    delta.insert("color", "blue");
    assert!(delta.removed.is_empty());
    assert_eq!(delta.modified.get("color"), Some(&Value::from("blue")));
}

#[test]
fn test_cleared_dictionary() {
    let mut delta = DictionaryDelta::new();
    delta.clear();
    delta.insert("only", "me");
    let baseline = dictionary(&[("fubu", "x")]);
    assert_eq!(
        Delta::Dictionary(delta).apply(&baseline).unwrap(),
        dictionary(&[("only", "me")])
    );
}

// ============================================================================
// Objects
// ============================================================================

#[test]
fn test_diff_keeps_changed_properties() {
    let original = critter(1, "Bob", 8);
    let updated = critter(1, "Bob", 9).with("State", "Dead");
    let delta = ObjectDelta::diff(&original, &updated);
    assert_eq!(delta.uri(), Some("http://test/critters/1"));
    assert_eq!(delta.type_name(), Some("Critter"));
    let changed: Vec<&str> = delta.changes.keys().map(String::as_str).collect();
    assert_eq!(changed, vec!["Number", "State"]);
    assert!(ObjectDelta::diff(&original, &original).is_empty());

    let applied = Delta::Object(delta).apply(&Value::Resource(original)).unwrap();
    assert_eq!(applied, Value::Resource(updated));
}

#[test]
fn test_nested_delta_patches_property() {
    let mut attributes = DictionaryDelta::new();
    attributes.insert("color", "red");
    let mut tags = CollectionDelta::new();
    tags.add("bald");

    let mut delta = ObjectDelta::new(critter(1, "Bob", 8));
    delta.set("Attributes", Delta::Dictionary(attributes));
    delta.set("Tags", Delta::Collection(tags));

    let applied = Delta::Object(delta)
        .apply(&Value::Resource(critter(1, "Bob", 8)))
        .unwrap();
    let Value::Resource(bob) = applied else {
        panic!("Expected resource");
    };
    assert_eq!(bob.get("Attributes"), Some(&dictionary(&[("color", "red")])));
    assert_eq!(
        bob.get("Tags"),
        Some(&Value::Array(vec![Value::from("furry"), Value::from("bald")]))
    );
}

#[test]
fn test_object_delta_onto_null_starts_from_original() {
    let mut delta = ObjectDelta::new(Resource::new("Hat").with_uri("http://test/hats/3"));
    delta.set("HatType", "beret");
    assert_eq!(
        Delta::Object(delta).apply(&Value::Null).unwrap(),
        Value::Resource(
            Resource::new("Hat")
                .with_uri("http://test/hats/3")
                .with("HatType", "beret")
        )
    );
}

#[test]
fn test_shape_mismatch() {
    let dictionary_delta = Delta::Dictionary(DictionaryDelta::new());
    assert!(matches!(
        dictionary_delta.apply(&Value::Array(vec![])),
        Err(DeltaError::Mismatch { delta: "dictionary", .. })
    ));
    let collection_delta = Delta::Collection(CollectionDelta::new());
    assert!(matches!(
        collection_delta.apply(&Value::Integer(1)),
        Err(DeltaError::Mismatch { delta: "collection", .. })
    ));
    let object_delta = Delta::Object(ObjectDelta::new(Resource::new("Hat")));
    assert!(matches!(
        object_delta.apply(&Value::from("hat")),
        Err(DeltaError::Mismatch { delta: "object", .. })
    ));
}

#[test]
fn test_nested_mismatch_propagates() {
    let mut delta = ObjectDelta::new(critter(1, "Bob", 8));
    delta.set("Name", Delta::Dictionary(DictionaryDelta::new()));
    assert!(matches!(
        Delta::Object(delta).apply(&Value::Resource(critter(1, "Bob", 8))),
        Err(DeltaError::Mismatch { delta: "dictionary", .. })
    ));
}
