// tests/proxy_tests.rs

mod common;

use std::sync::Arc;

use common::{FakeClient, critter_type, hat, schema, weapon};
use plume_query::error::ProxyError;
use plume_query::proxy::{LazyList, LazyReference, PostForm};
use plume_query::serialization::ClientDeserializationContext;
use plume_query::{Deserializer, Resource, Value};

const HAT_URI: &str = "http://test/hats/1";
const WEAPONS_URI: &str = "http://test/critters/1/weapons";

fn client() -> Arc<FakeClient> {
    Arc::new(
        FakeClient::default()
            .with(HAT_URI, Value::Resource(hat(1, "fedora")))
            .with(
                WEAPONS_URI,
                Value::Array(vec![weapon("bazooka", 3.5), weapon("spoon", 0.5)]),
            )
            .with("http://test/numbers/1", Value::Integer(1)),
    )
}

// ============================================================================
// Lazy references
// ============================================================================

#[test]
fn test_reference_fetches_once() {
    let client = client();
    let reference = LazyReference::new(HAT_URI, Some("Hat".to_string()), client.clone());
    assert!(!reference.is_loaded());
    assert_eq!(client.fetch_count(), 0);

    assert_eq!(reference.get("HatType").unwrap(), Value::from("fedora"));
    assert_eq!(reference.get("Size").unwrap(), Value::Integer(8));
    assert!(reference.is_loaded());
    assert_eq!(client.fetch_count(), 1);
}

#[test]
fn test_invalidate_refetches() {
    let client = client();
    let reference = LazyReference::new(HAT_URI, None, client.clone());
    reference.resolve().unwrap();
    reference.invalidate();
    assert!(!reference.is_loaded());
    assert_eq!(reference.resolve().unwrap(), hat(1, "fedora"));
    assert_eq!(client.fetch_count(), 2);
}

#[test]
fn test_clones_share_cache() {
    let client = client();
    let reference = LazyReference::new(HAT_URI, None, client.clone());
    let other = reference.clone();
    reference.resolve().unwrap();
    assert!(other.is_loaded());
    other.resolve().unwrap();
    assert_eq!(client.fetch_count(), 1);
}

#[test]
fn test_concurrent_resolve_fetches_once() {
    let client = client();
    let reference = LazyReference::new(HAT_URI, None, client.clone());
    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| reference.resolve().unwrap());
        }
    });
    assert_eq!(client.fetch_count(), 1);
}

#[test]
fn test_missing_property_reads_null() {
    let reference = LazyReference::new(HAT_URI, None, client());
    assert_eq!(reference.get("Color").unwrap(), Value::Null);
}

#[test]
fn test_reference_errors() {
    let client = client();
    let missing = LazyReference::new("http://test/hats/9", None, client.clone());
    assert!(matches!(missing.resolve(), Err(ProxyError::Fetch { .. })));
    assert!(!missing.is_loaded());

    let scalar = LazyReference::new("http://test/numbers/1", None, client);
    assert_eq!(
        scalar.resolve(),
        Err(ProxyError::NotAResource("http://test/numbers/1".to_string()))
    );
}

// ============================================================================
// Lazy lists
// ============================================================================

#[test]
fn test_list_loads_on_first_access() {
    let client = client();
    let list = LazyList::new(WEAPONS_URI, client.clone());
    assert!(!list.is_loaded());
    assert_eq!(list.len().unwrap(), 2);
    assert_eq!(list.get(1).unwrap(), weapon("spoon", 0.5));
    assert!(!list.is_empty().unwrap());
    assert_eq!(list.resolve().unwrap().len(), 2);
    assert_eq!(client.fetch_count(), 1);

    list.invalidate();
    assert!(!list.is_loaded());
    list.len().unwrap();
    assert_eq!(client.fetch_count(), 2);
}

#[test]
fn test_list_index_out_of_range() {
    let list = LazyList::new(WEAPONS_URI, client());
    assert_eq!(list.get(5), Err(ProxyError::OutOfRange { index: 5, len: 2 }));
}

#[test]
fn test_list_of_non_collection() {
    let list = LazyList::new(HAT_URI, client());
    assert!(matches!(list.resolve(), Err(ProxyError::Fetch { .. })));
}

#[test]
fn test_list_is_read_only() {
    let client = client();
    let list = LazyList::new(WEAPONS_URI, client.clone());
    let item = weapon("fork", 1.0);
    assert_eq!(list.push(item.clone()), Err(ProxyError::ReadOnly("Add")));
    assert_eq!(list.insert(0, item.clone()), Err(ProxyError::ReadOnly("Insert")));
    assert_eq!(list.set(0, item.clone()), Err(ProxyError::ReadOnly("set_Item")));
    assert_eq!(list.remove(&item), Err(ProxyError::ReadOnly("Remove")));
    assert_eq!(list.remove_at(0), Err(ProxyError::ReadOnly("RemoveAt")));
    assert_eq!(list.clear(), Err(ProxyError::ReadOnly("Clear")));
    // Refusing a mutation never fetches.
    assert_eq!(client.fetch_count(), 0);
}

// ============================================================================
// Client deserialization
// ============================================================================

#[test]
fn test_client_context_creates_proxies() {
    let schema = schema();
    let client = client();
    let context = ClientDeserializationContext::new(&schema, client.clone());
    let json = format!(
        r#"{{"_uri":"http://test/critters/1","name":"Bob","hat":{{"_ref":"{}"}},"weapons":{{"_ref":"{}"}}}}"#,
        HAT_URI, WEAPONS_URI
    );
    let value = Deserializer::new(&context)
        .deserialize(&json, Some(&critter_type()))
        .unwrap();
    let Value::Resource(bob) = value else {
        panic!("Expected resource");
    };

    let Some(Value::Reference(hat_ref)) = bob.get("Hat") else {
        panic!("Expected lazy reference, got {:?}", bob.get("Hat"));
    };
    assert_eq!(hat_ref.uri(), HAT_URI);
    assert_eq!(hat_ref.type_name(), Some("Hat"));

    let Some(Value::List(weapons)) = bob.get("Weapons") else {
        panic!("Expected lazy list, got {:?}", bob.get("Weapons"));
    };
    assert_eq!(weapons.uri(), WEAPONS_URI);
    assert_eq!(client.fetch_count(), 0);

    assert_eq!(hat_ref.get("HatType").unwrap(), Value::from("fedora"));
    assert_eq!(weapons.len().unwrap(), 2);
    assert_eq!(client.fetch_count(), 2);
}

#[test]
fn test_reference_keeps_subclass_tag() {
    let schema = schema();
    let context = ClientDeserializationContext::new(&schema, client());
    let value = Deserializer::new(&context)
        .deserialize(
            r#"{"friend":{"_ref":"http://test/critters/5","_type":"MusicalCritter"}}"#,
            Some(&critter_type()),
        )
        .unwrap();
    let Value::Resource(critter) = value else {
        panic!("Expected resource");
    };
    match critter.get("Friend") {
        Some(Value::Reference(friend)) => assert_eq!(friend.type_name(), Some("MusicalCritter")),
        other => panic!("Expected lazy reference, got {:?}", other),
    }
}

// ============================================================================
// Post forms
// ============================================================================

#[test]
fn test_post_form_tracks_dirty_properties() {
    let mut form = PostForm::new("Critter");
    assert_eq!(form.type_name(), "Critter");
    form.set("Name", "Neo");
    form.set("Number", 0);
    assert!(form.is_dirty("Name"));
    assert!(!form.is_dirty("Hat"));
    assert_eq!(form.get("Number"), Some(&Value::Integer(0)));
    assert_eq!(form.dirty_properties().collect::<Vec<_>>(), vec!["Name", "Number"]);
}

#[test]
fn test_post_form_list() {
    let mut form = PostForm::new("Critter");
    {
        let mut tags = form.list("Tags");
        assert!(tags.is_empty());
        tags.push("a");
        tags.push("c");
        tags.insert(1, "b").unwrap();
        tags.set(0, "A").unwrap();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags.get(1), Some(&Value::from("b")));
        assert!(tags.remove(&Value::from("c")));
        assert!(!tags.remove(&Value::from("zzz")));
        assert_eq!(tags.remove_at(1).unwrap(), Value::from("b"));
        assert_eq!(
            tags.insert(5, "x"),
            Err(ProxyError::OutOfRange { index: 5, len: 1 })
        );
        assert_eq!(
            tags.set(1, "x"),
            Err(ProxyError::OutOfRange { index: 1, len: 1 })
        );
        assert!(tags.remove_at(3).is_err());
    }
    assert!(form.is_dirty("Tags"));
    assert_eq!(form.get("Tags"), Some(&Value::Array(vec![Value::from("A")])));

    form.list("Tags").clear();
    assert_eq!(form.get("Tags"), Some(&Value::Array(vec![])));
}

#[test]
fn test_touching_empty_list_is_dirty() {
    let mut form = PostForm::new("Critter");
    form.list("Weapons").clear();
    assert_eq!(
        form.to_resource(),
        Resource::new("Critter").with("Weapons", Value::Array(vec![]))
    );
}

#[test]
fn test_post_form_dictionary() {
    let mut form = PostForm::new("Critter");
    {
        let mut attributes = form.dictionary("Attributes");
        assert_eq!(attributes.insert("color", "red"), None);
        assert_eq!(attributes.insert("color", "blue"), Some(Value::from("red")));
        attributes.insert("fubu", "yes");
        assert_eq!(attributes.remove("fubu"), Some(Value::from("yes")));
        assert_eq!(attributes.get("color"), Some(&Value::from("blue")));
        assert_eq!(attributes.get("fubu"), None);
    }
    form.set("Name", "Neo");

    let resource = form.to_resource();
    assert_eq!(resource.type_name.as_deref(), Some("Critter"));
    let names: Vec<&str> = resource.properties.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["Attributes", "Name"]);

    form.dictionary("Attributes").clear();
    assert_eq!(
        form.get("Attributes"),
        Some(&Value::Dictionary(Default::default()))
    );
}
