use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};
use uuid::Uuid;

use crate::{
    delta::Delta,
    proxy::{LazyList, LazyReference},
    types::TypeRef,
};

/// A structured object: a mapped resource, a value object or an anonymous
/// projection record.
///
/// Properties are keyed by their declared (not wire) name and keep
/// insertion order, which is the order the serializer writes them in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Resource {
    /// Mapped type name; `None` for anonymous records.
    pub type_name: Option<String>,
    /// Location of the resource, when it has identity.
    pub uri: Option<String>,
    pub properties: IndexMap<String, Value>,
}

impl Resource {
    pub fn new(type_name: impl Into<String>) -> Self {
        Resource {
            type_name: Some(type_name.into()),
            uri: None,
            properties: IndexMap::new(),
        }
    }

    pub fn anonymous() -> Self {
        Resource::default()
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Case-insensitive lookup, used by the evaluator for member access.
    pub fn get_ignore_case(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).or_else(|| {
            self.properties
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }
}

/// Runtime values flowing through the evaluator and the serializer.
///
/// Integers of every width share [`Value::Integer`]; the static type carried
/// alongside (expression type or serializer node type) says which width was
/// meant. Decimals stay exact.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,

    Boolean(bool),

    /// Int32 and Int64
    Integer(i64),

    /// Double
    Float(f64),

    Decimal(Decimal),

    /// Strings and enum member names
    String(String),

    Guid(Uuid),

    DateTime(DateTime<Utc>),

    /// A `System.Type`-like value (`t'Critter'`)
    Type(TypeRef),

    Array(Vec<Value>),

    /// String-keyed, insertion ordered
    Dictionary(IndexMap<String, Value>),

    Resource(Resource),

    /// Result element of `GroupBy`
    Grouping { key: Box<Value>, items: Vec<Value> },

    /// Not-yet-fetched single resource
    Reference(LazyReference),

    /// Not-yet-fetched, read-only collection
    List(LazyList),

    /// Partial update relative to some baseline
    Delta(Box<Delta>),
}

impl Value {
    /// Human-readable kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Guid(_) => "guid",
            Value::DateTime(_) => "datetime",
            Value::Type(_) => "type",
            Value::Array(_) => "array",
            Value::Dictionary(_) => "dictionary",
            Value::Resource(_) => "resource",
            Value::Grouping { .. } => "grouping",
            Value::Reference(_) => "reference",
            Value::List(_) => "lazy list",
            Value::Delta(_) => "delta",
        }
    }

    /// Best guess at the runtime type of a value, for `_type` tagging.
    ///
    /// Returns `None` for anonymous records and values whose type depends
    /// entirely on context.
    pub fn runtime_type(&self) -> Option<TypeRef> {
        let ty = match self {
            Value::Boolean(_) => TypeRef::Boolean,
            Value::Integer(n) if i32::try_from(*n).is_ok() => TypeRef::Int32,
            Value::Integer(_) => TypeRef::Int64,
            Value::Float(_) => TypeRef::Double,
            Value::Decimal(_) => TypeRef::Decimal,
            Value::String(_) => TypeRef::String,
            Value::Guid(_) => TypeRef::Guid,
            Value::DateTime(_) => TypeRef::DateTime,
            Value::Type(_) => TypeRef::Type,
            Value::Resource(r) => TypeRef::Structured(r.type_name.clone()?),
            Value::Reference(r) => TypeRef::Structured(r.type_name()?.to_string()),
            _ => return None,
        };
        Some(ty)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Float(n) => Some(n.round() as i64),
            Value::Decimal(d) => d.round().to_i64(),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(n) => Decimal::from_i64(*n),
            Value::Float(n) => Decimal::from_f64(*n),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as string (concatenation)
    pub fn as_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Float(n) => n.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Guid(g) => g.to_string(),
            Value::DateTime(d) => d.to_rfc3339(),
            Value::Type(t) => t.to_string(),
            Value::Null => "null".to_string(),
            _ => format!("{:?}", self),
        }
    }

    /// Items of an in-memory sequence. Groupings expose their members.
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) | Value::Grouping { items, .. } => Some(items),
            _ => None,
        }
    }

    /// Ordering used by sorting operators and relational comparisons.
    ///
    /// Numbers compare across representations, `null` sorts first, and
    /// values of unrelated kinds compare equal.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Decimal(_), _) | (_, Value::Decimal(_)) => {
                match (self.as_decimal(), other.as_decimal()) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    _ => Ordering::Equal,
                }
            }
            (Value::Float(_) | Value::Integer(_), Value::Float(_) | Value::Integer(_)) => {
                match (self.as_float(), other.as_float()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                }
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Guid(a), Value::Guid(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }

    /// Equality with numeric representations unified (`2 == 2.0m`).
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (
                Value::Integer(_) | Value::Float(_) | Value::Decimal(_),
                Value::Integer(_) | Value::Float(_) | Value::Decimal(_),
            ) => self.compare(other) == Ordering::Equal,
            (Value::Reference(a), Value::Resource(b)) | (Value::Resource(b), Value::Reference(a)) => {
                b.uri.as_deref() == Some(a.uri())
            }
            _ => self == other,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Uuid> for Value {
    fn from(g: Uuid) -> Self {
        Value::Guid(g)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::DateTime(d)
    }
}

impl From<Resource> for Value {
    fn from(r: Resource) -> Self {
        Value::Resource(r)
    }
}

impl From<Delta> for Value {
    fn from(d: Delta) -> Self {
        Value::Delta(Box::new(d))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[test]
fn test_numeric_comparison_across_representations() {
    assert_eq!(Value::Integer(2).compare(&Value::Float(2.5)), Ordering::Less);
    assert!(Value::Integer(2).loosely_equals(&Value::Decimal(Decimal::new(20, 1))));
    assert_eq!(Value::Null.compare(&Value::Integer(0)), Ordering::Less);
}
