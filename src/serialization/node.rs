//! Serializer and deserializer nodes: a value paired with its expected
//! (static) type and its actual (dynamic) type.

use serde_json::Value as JsonValue;

use crate::{
    delta::Delta,
    error::SerializationError,
    schema::TypeMapper,
    serialization::names::{REF_KEY, TYPE_KEY},
    types::{SerializationMode, TypeRef},
    value::Value,
};

/// One value on its way out.
#[derive(Debug, Clone)]
pub struct SerializerNode<'v> {
    pub value: &'v Value,
    pub expected_type: TypeRef,
    pub value_type: TypeRef,
    /// Own URI for resources, `parent/jsonName` for collection properties.
    pub uri: Option<String>,
    /// Dotted, lowercased property path from the root.
    pub expand_path: String,
    pub always_expand: bool,
}

impl<'v> SerializerNode<'v> {
    pub fn root(value: &'v Value, expected_type: TypeRef) -> Self {
        let value_type = runtime_type(value, &expected_type);
        SerializerNode {
            uri: own_uri(value),
            value,
            expected_type,
            value_type,
            expand_path: String::new(),
            always_expand: false,
        }
    }

    /// The root and the items of a root collection are always written in
    /// full.
    pub fn is_top_level(&self) -> bool {
        self.expand_path.is_empty()
    }

    /// Node for a property value of this (structured) node.
    pub fn property(
        &self,
        value: &'v Value,
        json_name: &str,
        expand_name: &str,
        ty: TypeRef,
        always_expand: bool,
    ) -> SerializerNode<'v> {
        let uri = own_uri(value).or_else(|| {
            self.uri
                .as_ref()
                .map(|parent| format!("{}/{}", parent.trim_end_matches('/'), json_name))
        });
        let expand_path = if self.expand_path.is_empty() {
            expand_name.to_string()
        } else {
            format!("{}.{}", self.expand_path, expand_name)
        };
        SerializerNode {
            value_type: runtime_type(value, &ty),
            value,
            expected_type: ty,
            uri,
            expand_path,
            always_expand,
        }
    }

    /// Node for an element of this (array) node. Elements share the
    /// collection's expand path.
    pub fn item(&self, value: &'v Value, element_type: TypeRef) -> SerializerNode<'v> {
        SerializerNode {
            value_type: runtime_type(value, &element_type),
            uri: own_uri(value),
            value,
            expected_type: element_type,
            expand_path: self.expand_path.clone(),
            always_expand: false,
        }
    }

    pub fn mode(&self, mapper: &dyn TypeMapper) -> SerializationMode {
        mapper.serialization_mode(&self.value_type)
    }

    /// `_type` is written only when it tells the reader something new.
    pub fn needs_type_tag(&self) -> bool {
        !matches!(self.value_type, TypeRef::Anonymous(_) | TypeRef::Grouping(..))
            && self.value_type.underlying() != self.expected_type.underlying()
    }
}

fn own_uri(value: &Value) -> Option<String> {
    match value {
        Value::Resource(resource) => resource.uri.clone(),
        Value::Reference(reference) => Some(reference.uri().to_string()),
        Value::List(list) => Some(list.uri().to_string()),
        Value::Delta(delta) => match delta.as_ref() {
            Delta::Object(object) => object.uri().map(str::to_string),
            _ => None,
        },
        _ => None,
    }
}

/// Dynamic type of `value` where `expected` is the static type.
fn runtime_type(value: &Value, expected: &TypeRef) -> TypeRef {
    let named = match value {
        Value::Resource(resource) => resource.type_name.as_deref(),
        Value::Reference(reference) => reference.type_name(),
        Value::Delta(delta) => match delta.as_ref() {
            Delta::Object(object) => object.type_name(),
            _ => None,
        },
        _ => None,
    };
    if let Some(name) = named {
        return TypeRef::Structured(name.to_string());
    }
    if expected.underlying() != &TypeRef::Object {
        return expected.clone();
    }
    match value {
        Value::Array(_) | Value::List(_) => TypeRef::array(TypeRef::Object),
        Value::Dictionary(_) => TypeRef::dictionary(TypeRef::Object),
        Value::Resource(_) => TypeRef::Anonymous(Vec::new()),
        Value::Grouping { .. } => {
            TypeRef::Grouping(Box::new(TypeRef::Object), Box::new(TypeRef::Object))
        }
        other => other.runtime_type().unwrap_or(TypeRef::Object),
    }
}

/// One JSON value on its way in.
#[derive(Debug, Clone)]
pub struct DeserializerNode<'j> {
    pub json: &'j JsonValue,
    pub expected_type: Option<TypeRef>,
    /// From `_type` when present, else the expected type.
    pub value_type: TypeRef,
}

impl<'j> DeserializerNode<'j> {
    pub fn new(
        json: &'j JsonValue,
        expected_type: Option<TypeRef>,
        mapper: &dyn TypeMapper,
    ) -> Result<Self, SerializationError> {
        let tagged = json
            .as_object()
            .and_then(|object| object.get(TYPE_KEY))
            .and_then(JsonValue::as_str);

        let value_type = match (tagged, &expected_type) {
            (Some(name), expected) => {
                let ty = resolve_wire_type(name, mapper)?;
                if let Some(expected) = expected
                    && !mapper.is_assignable(expected, &ty)
                {
                    return Err(SerializationError::IncompatibleType {
                        expected: expected.to_string(),
                        found: ty.to_string(),
                    });
                }
                ty
            }
            (None, Some(expected)) if expected.underlying() == &TypeRef::Object => {
                untagged_shape(json).unwrap_or_else(|| expected.clone())
            }
            (None, Some(expected)) => expected.clone(),
            (None, None) if json.is_object() => return Err(SerializationError::MissingType),
            (None, None) => untagged_shape(json).unwrap_or(TypeRef::Object),
        };

        Ok(DeserializerNode {
            json,
            expected_type,
            value_type,
        })
    }

    pub fn mode(&self, mapper: &dyn TypeMapper) -> SerializationMode {
        mapper.serialization_mode(&self.value_type)
    }
}

/// Containers written under `Object` carry no tag. Arrays come back as
/// `Array<Object>` and plain objects as `Dictionary<String, Object>`;
/// references keep their declared type.
fn untagged_shape(json: &JsonValue) -> Option<TypeRef> {
    match json {
        JsonValue::Array(_) => Some(TypeRef::array(TypeRef::Object)),
        JsonValue::Object(object) if !object.contains_key(REF_KEY) => {
            Some(TypeRef::dictionary(TypeRef::Object))
        }
        _ => None,
    }
}

/// Resolves a `_type` discriminator: mapped names first, then the
/// intrinsic and generic spellings.
pub fn resolve_wire_type(name: &str, mapper: &dyn TypeMapper) -> Result<TypeRef, SerializationError> {
    if let Some(ty) = mapper.resolve_type_name(name) {
        return Ok(ty);
    }
    match name.parse::<TypeRef>() {
        Ok(TypeRef::Structured(_)) | Err(_) => Err(SerializationError::UnknownType(name.to_string())),
        Ok(ty) => Ok(ty),
    }
}
