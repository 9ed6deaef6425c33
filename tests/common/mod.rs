// tests/common/mod.rs
//
// Fixture schema shared by the integration tests: critters with hats and
// weapons, a musical subclass, and an enum.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use plume_query::{
    TypeRef, Value,
    error::ProxyError,
    expr::ExprRef,
    proxy::ResourceFetcher,
    schema::{PropertySpec, Schema, StructuredType},
    value::Resource,
};

pub fn schema() -> Schema {
    Schema::new()
        .with_enum("CritterState", ["Alive", "Sleeping", "Dead"])
        .with_type(
            StructuredType::new("Critter")
                .resource("critters")
                .property(PropertySpec::new("Id", TypeRef::Int32).primary_key())
                .property(PropertySpec::new("Name", TypeRef::String))
                .property(PropertySpec::new("Number", TypeRef::Int32))
                .property(PropertySpec::new("Price", TypeRef::Decimal))
                .property(PropertySpec::new("Score", TypeRef::Double.nullable()))
                .property(PropertySpec::new("BirthDate", TypeRef::DateTime))
                .property(PropertySpec::new("State", TypeRef::Enum("CritterState".into())))
                .property(PropertySpec::new("Hat", TypeRef::structured("Hat")))
                .property(PropertySpec::new("Weapons", TypeRef::array(TypeRef::structured("Weapon"))))
                .property(PropertySpec::new("Tags", TypeRef::array(TypeRef::String)))
                .property(PropertySpec::new("Attributes", TypeRef::dictionary(TypeRef::String)))
                .property(PropertySpec::new("Friend", TypeRef::structured("Critter"))),
        )
        .with_type(
            StructuredType::new("MusicalCritter")
                .extends("Critter")
                .property(PropertySpec::new("Instrument", TypeRef::String)),
        )
        .with_type(
            StructuredType::new("Hat")
                .resource("hats")
                .property(PropertySpec::new("Id", TypeRef::Int32).primary_key())
                .property(PropertySpec::new("HatType", TypeRef::String))
                .property(PropertySpec::new("Size", TypeRef::Int32)),
        )
        .with_type(
            StructuredType::new("Weapon")
                .property(PropertySpec::new("Model", TypeRef::String))
                .property(PropertySpec::new("Strength", TypeRef::Double)),
        )
}

pub fn critter_type() -> TypeRef {
    TypeRef::structured("Critter")
}

/// Binds `filter` against `Critter` and renders the resulting lambda.
pub fn filter_text(filter: &str) -> String {
    bind_filter(filter).to_string()
}

pub fn bind_filter(filter: &str) -> ExprRef {
    let schema = schema();
    plume_query::parse_filter(&schema, &critter_type(), filter)
        .unwrap_or_else(|e| panic!("failed to bind '{}':\n{}", filter, e))
}

pub fn hat(id: i64, hat_type: &str) -> Resource {
    Resource::new("Hat")
        .with_uri(format!("http://test/hats/{}", id))
        .with("Id", id)
        .with("HatType", hat_type)
        .with("Size", 8)
}

pub fn weapon(model: &str, strength: f64) -> Value {
    Value::Resource(
        Resource::new("Weapon")
            .with("Model", model)
            .with("Strength", strength),
    )
}

pub fn critter(id: i64, name: &str, number: i64) -> Resource {
    Resource::new("Critter")
        .with_uri(format!("http://test/critters/{}", id))
        .with("Id", id)
        .with("Name", name)
        .with("Number", number)
        .with("Price", Value::Decimal(rust_decimal::Decimal::new(1999, 2)))
        .with("Score", Value::Null)
        .with(
            "BirthDate",
            Value::DateTime(
                chrono::DateTime::parse_from_rfc3339("2014-02-11T12:30:00Z")
                    .map(|d| d.with_timezone(&chrono::Utc))
                    .unwrap(),
            ),
        )
        .with("State", "Alive")
        .with("Hat", Value::Resource(hat(id, "fedora")))
        .with("Weapons", Value::Array(vec![weapon("bazooka", 3.5), weapon("spoon", 0.5)]))
        .with("Tags", Value::Array(vec![Value::from("furry")]))
        .with("Attributes", Value::Dictionary(Default::default()))
        .with("Friend", Value::Null)
}

pub fn critters() -> Vec<Value> {
    vec![
        Value::Resource(critter(1, "Bob", 8)),
        Value::Resource(
            critter(2, "Alice", 3)
                .with("State", "Sleeping")
                .with("Hat", Value::Resource(hat(2, "whatever")))
                .with("Score", 2.5),
        ),
        Value::Resource(critter(3, "Zed", 12).with("Weapons", Value::Array(vec![]))),
    ]
}

/// In-memory [`ResourceFetcher`] counting its fetches.
#[derive(Default)]
pub struct FakeClient {
    pub resources: Mutex<HashMap<String, Value>>,
    pub fetches: AtomicUsize,
}

impl FakeClient {
    pub fn with(self, uri: &str, value: Value) -> Self {
        self.resources.lock().insert(uri.to_string(), value);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ResourceFetcher for FakeClient {
    fn fetch(&self, uri: &str) -> Result<Value, ProxyError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.resources
            .lock()
            .get(uri)
            .cloned()
            .ok_or_else(|| ProxyError::Fetch {
                uri: uri.to_string(),
                message: "not found".to_string(),
            })
    }
}
