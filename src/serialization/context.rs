use std::{collections::HashSet, sync::Arc};

use crate::{
    error::SerializationError,
    proxy::{LazyList, LazyReference, ResourceFetcher},
    schema::TypeMapper,
    serialization::node::SerializerNode,
    types::{SerializationMode, TypeRef},
    value::{Resource, Value},
};

/// Dotted property paths to inline instead of writing as `_ref` markers.
///
/// `"hat,weapons.model"` expands `hat`, `weapons` and `weapons.model`:
/// every prefix of an entry is included. Matching is case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandPaths {
    paths: HashSet<String>,
    everything: bool,
}

impl ExpandPaths {
    pub fn none() -> Self {
        Self::default()
    }

    /// Expands every path; only already-visited resources become references.
    pub fn all() -> Self {
        ExpandPaths {
            paths: HashSet::new(),
            everything: true,
        }
    }

    pub fn parse(list: &str) -> Self {
        let mut expand = ExpandPaths::none();
        for entry in list.split(',') {
            let entry = entry.trim();
            if !entry.is_empty() {
                expand.add(entry);
            }
        }
        expand
    }

    pub fn add(&mut self, path: &str) {
        let path = path.to_lowercase();
        let mut prefix = String::new();
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment);
            self.paths.insert(prefix.clone());
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.everything || self.paths.contains(&path.to_lowercase())
    }
}

/// Decisions the serializer delegates to its caller.
pub trait SerializationContext {
    fn mapper(&self) -> &dyn TypeMapper;

    fn path_to_be_expanded(&self, path: &str) -> bool;

    /// Whether `node` is written as a `{"_ref": ...}` marker.
    ///
    /// Only resources with identity (and collections of them) qualify.
    fn serialize_as_reference(&self, node: &SerializerNode<'_>) -> bool {
        if node.is_top_level() || node.uri.is_none() || node.always_expand {
            return false;
        }
        let mapper = self.mapper();
        let identity_type = match mapper.serialization_mode(&node.value_type) {
            SerializationMode::Structured => &node.value_type,
            SerializationMode::Array => match node.value_type.element_type() {
                Some(element) => element,
                None => return false,
            },
            _ => return false,
        };
        let is_resource = match identity_type.underlying() {
            TypeRef::Structured(name) => mapper.is_resource(name),
            _ => false,
        };
        is_resource && !self.path_to_be_expanded(&node.expand_path)
    }
}

/// Server-side context: expand paths come from the request.
pub struct ServerSerializationContext<'m> {
    mapper: &'m dyn TypeMapper,
    expand: ExpandPaths,
}

impl<'m> ServerSerializationContext<'m> {
    pub fn new(mapper: &'m dyn TypeMapper, expand: ExpandPaths) -> Self {
        ServerSerializationContext { mapper, expand }
    }
}

impl SerializationContext for ServerSerializationContext<'_> {
    fn mapper(&self) -> &dyn TypeMapper {
        self.mapper
    }

    fn path_to_be_expanded(&self, path: &str) -> bool {
        self.expand.contains(path)
    }
}

/// Decisions the deserializer delegates to its caller.
pub trait DeserializationContext {
    fn mapper(&self) -> &dyn TypeMapper;

    /// Stand-in for a `{"_ref": uri}` marker of type `ty`.
    fn create_reference(&self, uri: &str, ty: &TypeRef) -> Result<Value, SerializationError>;
}

/// Client-side context: references become lazy proxies over `client`.
pub struct ClientDeserializationContext<'m> {
    mapper: &'m dyn TypeMapper,
    client: Arc<dyn ResourceFetcher>,
}

impl<'m> ClientDeserializationContext<'m> {
    pub fn new(mapper: &'m dyn TypeMapper, client: Arc<dyn ResourceFetcher>) -> Self {
        ClientDeserializationContext { mapper, client }
    }
}

impl DeserializationContext for ClientDeserializationContext<'_> {
    fn mapper(&self) -> &dyn TypeMapper {
        self.mapper
    }

    fn create_reference(&self, uri: &str, ty: &TypeRef) -> Result<Value, SerializationError> {
        match self.mapper.serialization_mode(ty) {
            SerializationMode::Array => Ok(Value::List(LazyList::new(uri, self.client.clone()))),
            SerializationMode::Structured => {
                let type_name = match ty.underlying() {
                    TypeRef::Structured(name) => Some(name.clone()),
                    _ => None,
                };
                Ok(Value::Reference(LazyReference::new(
                    uri,
                    type_name,
                    self.client.clone(),
                )))
            }
            mode => Err(SerializationError::Unsupported {
                value: "reference",
                mode: mode.to_string(),
            }),
        }
    }
}

/// Server-side context: a reference names an existing resource, so it
/// becomes a stub carrying only its URI and type.
pub struct ServerDeserializationContext<'m> {
    mapper: &'m dyn TypeMapper,
}

impl<'m> ServerDeserializationContext<'m> {
    pub fn new(mapper: &'m dyn TypeMapper) -> Self {
        ServerDeserializationContext { mapper }
    }
}

impl DeserializationContext for ServerDeserializationContext<'_> {
    fn mapper(&self) -> &dyn TypeMapper {
        self.mapper
    }

    fn create_reference(&self, uri: &str, ty: &TypeRef) -> Result<Value, SerializationError> {
        match ty.underlying() {
            TypeRef::Structured(name) => Ok(Value::Resource(Resource::new(name.clone()).with_uri(uri))),
            other => Err(SerializationError::Unsupported {
                value: "reference",
                mode: self.mapper.serialization_mode(other).to_string(),
            }),
        }
    }
}
