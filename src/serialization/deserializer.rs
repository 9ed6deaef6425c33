use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde_json::{Map, Value as JsonValue};
use tracing::trace;
use uuid::Uuid;

use crate::{
    delta::{CollectionDelta, Delta, DictionaryDelta, ObjectDelta},
    error::SerializationError,
    schema::TypeMapper,
    serialization::{
        QueryResult,
        context::DeserializationContext,
        names::{
            BOXED_VALUE_KEY, KeyMarker, REF_KEY, RESULT_TYPE, TYPE_KEY, URI_KEY,
            item_marker_name, split_marker, unescape_key,
        },
        node::{DeserializerNode, resolve_wire_type},
        plan::WritePlan,
    },
    types::{SerializationMode, TypeRef},
    value::{Resource, Value},
};

/// Reads the wire format back into [`Value`]s.
///
/// A `_ref` marker is checked before anything else and handed to the
/// context, which decides what stands in for the referenced value.
pub struct Deserializer<'c> {
    context: &'c dyn DeserializationContext,
}

impl<'c> Deserializer<'c> {
    pub fn new(context: &'c dyn DeserializationContext) -> Self {
        Deserializer { context }
    }

    fn mapper(&self) -> &dyn TypeMapper {
        self.context.mapper()
    }

    /// Reads a full value. Without an expected type, objects must carry `_type`.
    pub fn deserialize(&self, json: &str, expected: Option<&TypeRef>) -> Result<Value, SerializationError> {
        let parsed: JsonValue = serde_json::from_str(json)?;
        self.read_value(&parsed, expected)
    }

    /// Reads a patch payload into a [`Delta`] (or a plain value for scalars).
    pub fn deserialize_patch(&self, json: &str, expected: &TypeRef) -> Result<Value, SerializationError> {
        let parsed: JsonValue = serde_json::from_str(json)?;
        self.read(&parsed, Some(expected), true)
    }

    /// Reads a `__result__` envelope whose items are of `element_type`.
    pub fn deserialize_result(
        &self,
        json: &str,
        element_type: &TypeRef,
    ) -> Result<QueryResult, SerializationError> {
        let parsed: JsonValue = serde_json::from_str(json)?;
        let object = expect_object(&parsed, RESULT_TYPE)?;
        if object.get(TYPE_KEY).and_then(JsonValue::as_str) != Some(RESULT_TYPE) {
            return Err(unexpected(RESULT_TYPE, &parsed));
        }

        let items = match object.get("items") {
            Some(JsonValue::Array(items)) => items
                .iter()
                .map(|item| self.read_value(item, Some(element_type)))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => return Err(unexpected("items", other)),
            None => Vec::new(),
        };
        let total_count = match object.get("totalCount") {
            Some(count) => count
                .as_i64()
                .ok_or_else(|| unexpected("totalCount", count))?,
            None => items.len() as i64,
        };
        let link = |key: &str| object.get(key).and_then(JsonValue::as_str).map(str::to_string);
        let debug_info = match object.get("debugInfo") {
            Some(info) => Some(self.read_value(info, Some(&TypeRef::dictionary(TypeRef::Object)))?),
            None => None,
        };

        Ok(QueryResult {
            total_count,
            items,
            previous: link("previous"),
            next: link("next"),
            debug_info,
        })
    }

    pub fn read_value(&self, json: &JsonValue, expected: Option<&TypeRef>) -> Result<Value, SerializationError> {
        self.read(json, expected, false)
    }

    fn read(&self, json: &JsonValue, expected: Option<&TypeRef>, patch: bool) -> Result<Value, SerializationError> {
        if json.is_null() {
            return Ok(Value::Null);
        }

        // Reference short-circuit
        if let Some(object) = json.as_object()
            && let Some(uri) = object.get(REF_KEY).and_then(JsonValue::as_str)
        {
            let node = DeserializerNode::new(json, expected.cloned(), self.mapper())?;
            trace!(uri, ty = %node.value_type, "creating reference");
            return self.context.create_reference(uri, &node.value_type);
        }

        let node = DeserializerNode::new(json, expected.cloned(), self.mapper())?;
        match node.mode(self.mapper()) {
            SerializationMode::Value => read_scalar(json, &node.value_type, self.mapper()),
            SerializationMode::Array => self.read_array(&node, patch),
            SerializationMode::Dictionary => self.read_dictionary(&node, patch),
            SerializationMode::Structured => self.read_structured(&node, patch),
        }
    }

    fn read_array(&self, node: &DeserializerNode<'_>, patch: bool) -> Result<Value, SerializationError> {
        let JsonValue::Array(items) = node.json else {
            return Err(unexpected(&node.value_type.to_string(), node.json));
        };
        let element_type = node
            .value_type
            .element_type()
            .cloned()
            .unwrap_or(TypeRef::Object);

        if !patch {
            return items
                .iter()
                .map(|item| self.read(item, Some(&element_type), false))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array);
        }

        let mut delta = CollectionDelta::new();
        for item in items {
            match item_marker(item) {
                Some((KeyMarker::Modified, key)) => {
                    let modified = self.read_modified_item(item, key, &element_type)?;
                    delta.modify(modified);
                }
                Some((KeyMarker::Removed, key)) => {
                    let removed = self.read_item_identity(item, key, &element_type)?;
                    delta.removed.push(Value::Resource(removed));
                }
                _ => delta.add(self.read(item, Some(&element_type), false)?),
            }
        }
        Ok(Delta::Collection(delta).into())
    }

    fn read_dictionary(&self, node: &DeserializerNode<'_>, patch: bool) -> Result<Value, SerializationError> {
        let object = expect_object(node.json, &node.value_type.to_string())?;
        let value_type = match &node.value_type {
            TypeRef::Dictionary(value) => (**value).clone(),
            _ => TypeRef::Object,
        };

        if !patch {
            let mut map = IndexMap::with_capacity(object.len());
            for (key, value) in object {
                map.insert(
                    unescape_key(key).to_string(),
                    self.read(value, Some(&value_type), false)?,
                );
            }
            return Ok(Value::Dictionary(map));
        }

        let mut delta = DictionaryDelta::new();
        for (key, value) in object {
            match split_marker(key) {
                (KeyMarker::Removed, name) => delta.remove(name),
                (KeyMarker::Plain, name) => delta.insert(name, self.read(value, Some(&value_type), true)?),
                (KeyMarker::Replace, name) => {
                    delta.insert(name, self.read(value, Some(&value_type), false)?)
                }
                (KeyMarker::Modified, _) => return Err(unexpected("dictionary key", &JsonValue::String(key.clone()))),
            }
        }
        Ok(Delta::Dictionary(delta).into())
    }

    fn read_structured(&self, node: &DeserializerNode<'_>, patch: bool) -> Result<Value, SerializationError> {
        let object = expect_object(node.json, &node.value_type.to_string())?;
        let uri = object.get(URI_KEY).and_then(JsonValue::as_str).map(str::to_string);

        match &node.value_type {
            TypeRef::Structured(type_name) => {
                let plan = WritePlan::build(type_name, self.mapper())?;
                let mut properties = IndexMap::new();
                for (key, value) in object {
                    if key == TYPE_KEY || key == URI_KEY {
                        continue;
                    }
                    let (marker, json_name) = split_marker(key);
                    let property = plan.by_json_name(json_name).ok_or_else(|| {
                        SerializationError::UnknownProperty {
                            type_name: type_name.clone(),
                            property: key.clone(),
                        }
                    })?;
                    let nested_patch = match marker {
                        KeyMarker::Plain => patch,
                        KeyMarker::Replace if patch => false,
                        _ => {
                            return Err(SerializationError::UnknownProperty {
                                type_name: type_name.clone(),
                                property: key.clone(),
                            });
                        }
                    };
                    let value = self.read(value, Some(&property.ty), nested_patch)?;
                    properties.insert(property.name.clone(), value);
                }

                let mut original = Resource::new(type_name.clone());
                original.uri = uri;
                if patch {
                    let mut delta = ObjectDelta::new(original);
                    delta.changes = properties;
                    Ok(Delta::Object(delta).into())
                } else {
                    original.properties = properties;
                    Ok(Value::Resource(original))
                }
            }
            TypeRef::Grouping(key_type, element_type) => {
                let key = match object.get("key") {
                    Some(key) => self.read(key, Some(key_type), false)?,
                    None => Value::Null,
                };
                let items = match object.get("items") {
                    Some(JsonValue::Array(items)) => items
                        .iter()
                        .map(|item| self.read(item, Some(element_type), false))
                        .collect::<Result<Vec<_>, _>>()?,
                    Some(other) => return Err(unexpected("grouping items", other)),
                    None => Vec::new(),
                };
                Ok(Value::Grouping {
                    key: Box::new(key),
                    items,
                })
            }
            value_type => {
                let fields = match value_type {
                    TypeRef::Anonymous(fields) => fields.as_slice(),
                    _ => &[],
                };
                let mut resource = Resource::anonymous();
                resource.uri = uri;
                for (key, value) in object {
                    if key == TYPE_KEY || key == URI_KEY {
                        continue;
                    }
                    let name = unescape_key(key);
                    let ty = fields
                        .iter()
                        .find(|(field, _)| field == name)
                        .map(|(_, ty)| ty.clone())
                        .unwrap_or(TypeRef::Object);
                    resource
                        .properties
                        .insert(name.to_string(), self.read(value, Some(&ty), false)?);
                }
                Ok(Value::Resource(resource))
            }
        }
    }

    /// `{"*@id": 5, "name": "x"}` inside a collection patch.
    fn read_modified_item(
        &self,
        item: &JsonValue,
        key: &str,
        element_type: &TypeRef,
    ) -> Result<ObjectDelta, SerializationError> {
        let identity = self.read_item_identity(item, key, element_type)?;
        let type_name = identity.type_name.clone().unwrap_or_default();
        let plan = WritePlan::build(&type_name, self.mapper())?;
        let object = expect_object(item, &type_name)?;

        let mut delta = ObjectDelta::new(identity);
        for (json_key, value) in object {
            if json_key == key || json_key == TYPE_KEY {
                continue;
            }
            let (marker, json_name) = split_marker(json_key);
            let property = plan.by_json_name(json_name).ok_or_else(|| {
                SerializationError::UnknownProperty {
                    type_name: type_name.clone(),
                    property: json_key.clone(),
                }
            })?;
            let nested_patch = marker == KeyMarker::Plain;
            delta.set(property.name.clone(), self.read(value, Some(&property.ty), nested_patch)?);
        }
        Ok(delta)
    }

    /// Resource holding just the primary key named by an item marker.
    fn read_item_identity(
        &self,
        item: &JsonValue,
        key: &str,
        element_type: &TypeRef,
    ) -> Result<Resource, SerializationError> {
        let node = DeserializerNode::new(item, Some(element_type.clone()), self.mapper())?;
        let TypeRef::Structured(type_name) = node.value_type.underlying() else {
            return Err(unexpected(&element_type.to_string(), item));
        };
        let plan = WritePlan::build(type_name, self.mapper())?;
        let id_name = split_marker(key)
            .1
            .strip_prefix('@')
            .unwrap_or_default();
        let property = plan
            .primary_key()
            .filter(|p| p.json_name.eq_ignore_ascii_case(id_name))
            .ok_or_else(|| SerializationError::MissingPrimaryKey(type_name.clone()))?;

        let id_json = item
            .get(key)
            .ok_or_else(|| SerializationError::MissingPrimaryKey(type_name.clone()))?;
        let id = read_scalar(id_json, &property.ty, self.mapper())?;

        Ok(Resource::new(type_name.clone()).with(property.name.clone(), id))
    }
}

/// The `*@id` / `-@id` key of a patch item, if it has one.
fn item_marker(item: &JsonValue) -> Option<(KeyMarker, &str)> {
    item.as_object()?.keys().find_map(|key| {
        let (marker, name) = split_marker(key);
        match marker {
            KeyMarker::Modified | KeyMarker::Removed if item_marker_name(name).is_some() => {
                Some((marker, key.as_str()))
            }
            _ => None,
        }
    })
}

fn expect_object<'j>(json: &'j JsonValue, expected: &str) -> Result<&'j Map<String, JsonValue>, SerializationError> {
    json.as_object().ok_or_else(|| unexpected(expected, json))
}

fn json_kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn unexpected(expected: &str, found: &JsonValue) -> SerializationError {
    SerializationError::UnexpectedToken {
        expected: expected.to_string(),
        found: json_kind(found).to_string(),
    }
}

/// Reads a Value-mode JSON token as `ty`, unboxing `{"_type","value"}`.
fn read_scalar(json: &JsonValue, ty: &TypeRef, mapper: &dyn TypeMapper) -> Result<Value, SerializationError> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    if let Some(object) = json.as_object()
        && let Some(boxed) = object.get(BOXED_VALUE_KEY)
    {
        let inner = match object.get(TYPE_KEY).and_then(JsonValue::as_str) {
            Some(name) => resolve_wire_type(name, mapper)?,
            None => ty.clone(),
        };
        return read_scalar(boxed, &inner, mapper);
    }

    let mismatch = || unexpected(&ty.to_string(), json);
    let value = match ty.underlying() {
        TypeRef::Boolean => Value::Boolean(json.as_bool().ok_or_else(mismatch)?),
        TypeRef::Int32 | TypeRef::Int64 => Value::Integer(json.as_i64().ok_or_else(mismatch)?),
        TypeRef::Double => Value::Float(json.as_f64().ok_or_else(mismatch)?),
        TypeRef::Decimal => {
            let text = match json {
                JsonValue::Number(n) => n.to_string(),
                JsonValue::String(s) => s.clone(),
                _ => return Err(mismatch()),
            };
            let parsed = if text.contains(['e', 'E']) {
                Decimal::from_scientific(&text)
            } else {
                Decimal::from_str(&text)
            };
            Value::Decimal(parsed.map_err(|_| mismatch())?)
        }
        TypeRef::String => Value::String(json.as_str().ok_or_else(mismatch)?.to_string()),
        TypeRef::Guid => {
            let text = json.as_str().ok_or_else(mismatch)?;
            Value::Guid(Uuid::parse_str(text).map_err(|_| mismatch())?)
        }
        TypeRef::DateTime => {
            let text = json.as_str().ok_or_else(mismatch)?;
            Value::DateTime(parse_datetime(text).ok_or_else(mismatch)?)
        }
        TypeRef::Enum(name) => {
            let member = json.as_str().ok_or_else(mismatch)?;
            let known = mapper
                .enum_members(name)
                .is_none_or(|members| members.iter().any(|m| m == member));
            if !known {
                return Err(SerializationError::UnexpectedToken {
                    expected: format!("member of enum {}", name),
                    found: member.to_string(),
                });
            }
            Value::String(member.to_string())
        }
        TypeRef::Type => {
            let text = json.as_str().ok_or_else(mismatch)?;
            Value::Type(resolve_wire_type(text, mapper)?)
        }
        _ => infer_scalar(json)?,
    };
    Ok(value)
}

// Untyped (`Object`) scalars keep their JSON shape.
fn infer_scalar(json: &JsonValue) -> Result<Value, SerializationError> {
    match json {
        JsonValue::Bool(b) => Ok(Value::Boolean(*b)),
        JsonValue::Number(n) => Ok(match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        }),
        JsonValue::String(s) => Ok(Value::String(s.clone())),
        other => Err(unexpected("scalar", other)),
    }
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
