//! Type metadata consumed by the parser and the serializer.
//!
//! The engine never derives metadata itself. It talks to a [`TypeMapper`]
//! (class mappings, properties, serialization modes) and, while parsing, to
//! a [`TypeResolver`] (property paths and type names). [`Schema`] is a plain
//! in-memory mapper that can be built in code or loaded from JSON.

use heck::ToLowerCamelCase;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    expr::{Expr, ExprRef},
    types::{SerializationMode, TypeRef},
};

/// A mapped property of a structured type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySpec {
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: TypeRef,
    /// Overrides the camel-cased wire name.
    #[serde(default)]
    pub json_name: Option<String>,
    #[serde(default)]
    pub primary_key: bool,
    /// Always inlined, regardless of expand paths.
    #[serde(default)]
    pub always_expand: bool,
}

impl PropertySpec {
    pub fn new(name: impl Into<String>, property_type: TypeRef) -> Self {
        PropertySpec {
            name: name.into(),
            property_type,
            json_name: None,
            primary_key: false,
            always_expand: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn always_expanded(mut self) -> Self {
        self.always_expand = true;
        self
    }

    /// Name of the property in JSON payloads.
    pub fn json_name(&self) -> String {
        self.json_name
            .clone()
            .unwrap_or_else(|| self.name.to_lower_camel_case())
    }

    /// Segment used in dotted expand paths.
    pub fn expand_name(&self) -> String {
        self.name.to_lowercase()
    }
}

/// Class mapping of a structured type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredType {
    pub name: String,
    #[serde(default)]
    pub base: Option<String>,
    /// Collection path for resources with identity (`critters`). Types
    /// without one are value objects and are always written inline.
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
}

impl StructuredType {
    pub fn new(name: impl Into<String>) -> Self {
        StructuredType {
            name: name.into(),
            base: None,
            uri: None,
            properties: Vec::new(),
        }
    }

    pub fn resource(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn property(mut self, property: PropertySpec) -> Self {
        self.properties.push(property);
        self
    }
}

/// Metadata source for structured, enum and intrinsic types.
pub trait TypeMapper: Send + Sync {
    fn class_mapping(&self, name: &str) -> Option<&StructuredType>;

    fn enum_members(&self, name: &str) -> Option<&[String]>;

    /// Declared properties including inherited ones, base class first.
    fn properties(&self, name: &str) -> Vec<&PropertySpec> {
        let mut chain = Vec::new();
        let mut current = self.class_mapping(name);
        while let Some(class) = current {
            if chain.iter().any(|c: &&StructuredType| c.name == class.name) {
                break;
            }
            chain.push(class);
            current = class.base.as_deref().and_then(|b| self.class_mapping(b));
        }
        chain
            .into_iter()
            .rev()
            .flat_map(|class| class.properties.iter())
            .collect()
    }

    fn serialization_mode(&self, ty: &TypeRef) -> SerializationMode {
        ty.default_serialization_mode()
    }

    fn resolve_type_name(&self, name: &str) -> Option<TypeRef> {
        if let Some(ty) = TypeRef::from_intrinsic_name(name) {
            return Some(ty);
        }
        if let Some(class) = self.class_mapping(name) {
            return Some(TypeRef::Structured(class.name.clone()));
        }
        if self.enum_members(name).is_some() {
            return Some(TypeRef::Enum(name.to_string()));
        }
        None
    }

    fn primary_key(&self, name: &str) -> Option<&PropertySpec> {
        self.properties(name).into_iter().find(|p| p.primary_key)
    }

    /// Whether the type (or an ancestor) has resource identity.
    fn is_resource(&self, name: &str) -> bool {
        let mut current = self.class_mapping(name);
        let mut hops = 0;
        while let Some(class) = current {
            if class.uri.is_some() {
                return true;
            }
            hops += 1;
            if hops > 64 {
                break;
            }
            current = class.base.as_deref().and_then(|b| self.class_mapping(b));
        }
        false
    }

    fn is_subclass(&self, derived: &str, base: &str) -> bool {
        let mut current = Some(derived.to_string());
        let mut hops = 0;
        while let Some(name) = current {
            if name == base {
                return true;
            }
            hops += 1;
            if hops > 64 {
                break;
            }
            current = self.class_mapping(&name).and_then(|c| c.base.clone());
        }
        false
    }

    /// Whether a value of `source` can be stored where `target` is expected.
    fn is_assignable(&self, target: &TypeRef, source: &TypeRef) -> bool {
        if target == source {
            return true;
        }
        match (target, source) {
            (TypeRef::Object, _) => true,
            (_, TypeRef::Null) => target.can_be_null(),
            (TypeRef::Nullable(inner), other) => self.is_assignable(inner, other.underlying()),
            (TypeRef::Structured(base), TypeRef::Structured(derived)) => {
                self.is_subclass(derived, base)
            }
            (TypeRef::Array(t), TypeRef::Array(s) | TypeRef::Queryable(s)) => {
                self.is_assignable(t, s)
            }
            (TypeRef::Queryable(t), TypeRef::Queryable(s)) => self.is_assignable(t, s),
            (TypeRef::Dictionary(t), TypeRef::Dictionary(s)) => self.is_assignable(t, s),
            _ => false,
        }
    }
}

/// Property and type resolution used by the query binder.
pub trait TypeResolver {
    /// Resolves `name` (case-insensitively) as a member of `target`.
    fn resolve_property(&self, target: &ExprRef, name: &str) -> Option<ExprRef>;

    fn resolve_type(&self, name: &str) -> Option<TypeRef>;

    /// Member names of an enum type.
    fn enum_values(&self, name: &str) -> Option<Vec<String>>;

    fn can_assign(&self, target: &TypeRef, source: &TypeRef) -> bool;
}

impl<M: TypeMapper + ?Sized> TypeResolver for M {
    fn resolve_property(&self, target: &ExprRef, name: &str) -> Option<ExprRef> {
        match target.ty() {
            TypeRef::Structured(class) => self
                .properties(&class)
                .into_iter()
                .find(|p| p.name.eq_ignore_ascii_case(name))
                .map(|p| Expr::member(target.clone(), p.name.clone(), p.property_type.clone())),
            TypeRef::Anonymous(fields) => fields
                .iter()
                .find(|(field, _)| field.eq_ignore_ascii_case(name))
                .map(|(field, ty)| Expr::member(target.clone(), field.clone(), ty.clone())),
            TypeRef::Grouping(key, _) if name.eq_ignore_ascii_case("key") => {
                Some(Expr::member(target.clone(), "Key", *key))
            }
            _ => None,
        }
    }

    fn resolve_type(&self, name: &str) -> Option<TypeRef> {
        self.resolve_type_name(name)
    }

    fn enum_values(&self, name: &str) -> Option<Vec<String>> {
        self.enum_members(name).map(<[String]>::to_vec)
    }

    fn can_assign(&self, target: &TypeRef, source: &TypeRef) -> bool {
        self.is_assignable(target, source)
    }
}

/// Enum declaration in a schema document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumSpec {
    pub name: String,
    pub members: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SchemaDocument {
    #[serde(default)]
    types: Vec<StructuredType>,
    #[serde(default)]
    enums: Vec<EnumSpec>,
}

/// In-memory [`TypeMapper`].
#[derive(Debug, Clone, Default)]
pub struct Schema {
    classes: IndexMap<String, StructuredType>,
    enums: IndexMap<String, Vec<String>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, class: StructuredType) -> Self {
        self.add_type(class);
        self
    }

    pub fn with_enum<I, S>(mut self, name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enums
            .insert(name.into(), members.into_iter().map(Into::into).collect());
        self.link_enums();
        self
    }

    pub fn add_type(&mut self, class: StructuredType) {
        self.classes.insert(class.name.clone(), class);
        self.link_enums();
    }

    /// Loads `{"types": [...], "enums": [...]}`.
    pub fn from_json(json: &str) -> Result<Schema, serde_json::Error> {
        let document: SchemaDocument = serde_json::from_str(json)?;
        let mut schema = Schema::new();
        for spec in document.enums {
            schema.enums.insert(spec.name, spec.members);
        }
        for class in document.types {
            schema.classes.insert(class.name.clone(), class);
        }
        schema.link_enums();
        Ok(schema)
    }

    pub fn types(&self) -> impl Iterator<Item = &StructuredType> {
        self.classes.values()
    }

    // Type names parse as Structured until we know which ones are enums.
    fn link_enums(&mut self) {
        let enums = &self.enums;
        for class in self.classes.values_mut() {
            for property in &mut class.properties {
                link_enum_refs(&mut property.property_type, enums);
            }
        }
    }
}

fn link_enum_refs(ty: &mut TypeRef, enums: &IndexMap<String, Vec<String>>) {
    match ty {
        TypeRef::Structured(name) if enums.contains_key(name.as_str()) => {
            *ty = TypeRef::Enum(name.clone());
        }
        TypeRef::Nullable(inner)
        | TypeRef::Array(inner)
        | TypeRef::Queryable(inner)
        | TypeRef::Dictionary(inner) => link_enum_refs(inner, enums),
        TypeRef::Grouping(key, element) => {
            link_enum_refs(key, enums);
            link_enum_refs(element, enums);
        }
        _ => {}
    }
}

impl TypeMapper for Schema {
    fn class_mapping(&self, name: &str) -> Option<&StructuredType> {
        self.classes.get(name)
    }

    fn enum_members(&self, name: &str) -> Option<&[String]> {
        self.enums.get(name).map(Vec::as_slice)
    }
}
