//! Static types carried by expression nodes and serializer nodes.
//!
//! `TypeRef` is a closed set over the shapes the engine understands. Named
//! structured and enum types are resolved through a [`TypeMapper`]
//! (see [`crate::schema`]); everything else is intrinsic.
//!
//! [`TypeMapper`]: crate::schema::TypeMapper

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// How values of a type are laid out on the wire.
///
/// Every type resolves to exactly one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializationMode {
    Value,
    Array,
    Dictionary,
    Structured,
}

impl fmt::Display for SerializationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SerializationMode::Value => "Value",
            SerializationMode::Array => "Array",
            SerializationMode::Dictionary => "Dictionary",
            SerializationMode::Structured => "Structured",
        };
        f.write_str(name)
    }
}

/// A reference to a static type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeRef {
    Boolean,
    Int32,
    Int64,
    Double,
    Decimal,
    String,
    Guid,
    DateTime,
    /// `object`: the runtime type decides.
    Object,
    /// Type of an untyped `null` literal, before coercion.
    Null,
    /// A `System.Type` value, produced by `t'Name'` literals.
    Type,
    /// Named enum; values travel as member-name strings.
    Enum(String),
    Nullable(Box<TypeRef>),
    /// Named mapped class.
    Structured(String),
    /// Compiler-generated record type of a select projection.
    Anonymous(Vec<(String, TypeRef)>),
    /// In-memory sequence (`IEnumerable<T>`).
    Array(Box<TypeRef>),
    /// Deferred, expression-backed sequence (`IQueryable<T>`).
    Queryable(Box<TypeRef>),
    /// String-keyed dictionary with the given value type.
    Dictionary(Box<TypeRef>),
    /// A group produced by `GroupBy`: key type and element type.
    Grouping(Box<TypeRef>, Box<TypeRef>),
    /// Delegate type of a lambda.
    Function(Vec<TypeRef>, Box<TypeRef>),
}

impl TypeRef {
    pub fn array(element: TypeRef) -> TypeRef {
        TypeRef::Array(Box::new(element))
    }

    pub fn queryable(element: TypeRef) -> TypeRef {
        TypeRef::Queryable(Box::new(element))
    }

    pub fn dictionary(value: TypeRef) -> TypeRef {
        TypeRef::Dictionary(Box::new(value))
    }

    pub fn structured(name: impl Into<String>) -> TypeRef {
        TypeRef::Structured(name.into())
    }

    /// Wraps value types in `Nullable<>`; reference types are returned as-is.
    pub fn nullable(self) -> TypeRef {
        if self.is_value_type() {
            TypeRef::Nullable(Box::new(self))
        } else {
            self
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, TypeRef::Nullable(_))
    }

    /// Strips one `Nullable<>` layer.
    pub fn underlying(&self) -> &TypeRef {
        match self {
            TypeRef::Nullable(inner) => inner,
            other => other,
        }
    }

    /// Value types cannot hold `null` without a `Nullable<>` wrapper.
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            TypeRef::Boolean
                | TypeRef::Int32
                | TypeRef::Int64
                | TypeRef::Double
                | TypeRef::Decimal
                | TypeRef::Guid
                | TypeRef::DateTime
                | TypeRef::Enum(_)
        )
    }

    pub fn can_be_null(&self) -> bool {
        !self.is_value_type()
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_rank().is_some()
    }

    /// Widening order used for binary numeric promotion.
    pub fn numeric_rank(&self) -> Option<u8> {
        match self.underlying() {
            TypeRef::Int32 => Some(1),
            TypeRef::Int64 => Some(2),
            TypeRef::Decimal => Some(3),
            TypeRef::Double => Some(4),
            _ => None,
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(
            self,
            TypeRef::Array(_) | TypeRef::Queryable(_) | TypeRef::Grouping(..)
        )
    }

    pub fn is_queryable(&self) -> bool {
        matches!(self, TypeRef::Queryable(_))
    }

    /// Element type of a sequence.
    pub fn element_type(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Array(element) | TypeRef::Queryable(element) => Some(element),
            TypeRef::Grouping(_, element) => Some(element),
            _ => None,
        }
    }

    /// A sequence of `element` with the same flavour (queryable or not) as `self`.
    pub fn sequence_like(&self, element: TypeRef) -> TypeRef {
        match self {
            TypeRef::Queryable(_) => TypeRef::queryable(element),
            _ => TypeRef::array(element),
        }
    }

    /// Intrinsic serialization mode. Mappers may refine this.
    pub fn default_serialization_mode(&self) -> SerializationMode {
        match self {
            TypeRef::Structured(_) | TypeRef::Anonymous(_) | TypeRef::Grouping(..) => {
                SerializationMode::Structured
            }
            TypeRef::Array(_) | TypeRef::Queryable(_) => SerializationMode::Array,
            TypeRef::Dictionary(_) => SerializationMode::Dictionary,
            _ => SerializationMode::Value,
        }
    }

    /// Name used in `_type` discriminators.
    pub fn wire_name(&self) -> String {
        match self {
            TypeRef::Nullable(inner) => inner.wire_name(),
            TypeRef::Enum(name) | TypeRef::Structured(name) => name.clone(),
            other => other.to_string(),
        }
    }

    fn intrinsic(name: &str) -> Option<TypeRef> {
        let ty = match name {
            "Boolean" | "bool" => TypeRef::Boolean,
            "Int32" | "int" => TypeRef::Int32,
            "Int64" | "long" => TypeRef::Int64,
            "Double" | "double" => TypeRef::Double,
            "Decimal" | "decimal" => TypeRef::Decimal,
            "String" | "string" => TypeRef::String,
            "Guid" => TypeRef::Guid,
            "DateTime" => TypeRef::DateTime,
            "Object" | "object" => TypeRef::Object,
            "Type" => TypeRef::Type,
            _ => return None,
        };
        Some(ty)
    }

    /// Looks up a built-in scalar type by its wire or C# alias name.
    pub fn from_intrinsic_name(name: &str) -> Option<TypeRef> {
        TypeRef::intrinsic(name)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Boolean => f.write_str("Boolean"),
            TypeRef::Int32 => f.write_str("Int32"),
            TypeRef::Int64 => f.write_str("Int64"),
            TypeRef::Double => f.write_str("Double"),
            TypeRef::Decimal => f.write_str("Decimal"),
            TypeRef::String => f.write_str("String"),
            TypeRef::Guid => f.write_str("Guid"),
            TypeRef::DateTime => f.write_str("DateTime"),
            TypeRef::Object => f.write_str("Object"),
            TypeRef::Null => f.write_str("Null"),
            TypeRef::Type => f.write_str("Type"),
            TypeRef::Enum(name) | TypeRef::Structured(name) => f.write_str(name),
            TypeRef::Nullable(inner) => write!(f, "Nullable<{}>", inner),
            TypeRef::Anonymous(fields) => {
                f.write_str("<>Anonymous{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}:{}", name, ty)?;
                }
                f.write_str("}")
            }
            TypeRef::Array(element) => write!(f, "IEnumerable<{}>", element),
            TypeRef::Queryable(element) => write!(f, "IQueryable<{}>", element),
            TypeRef::Dictionary(value) => write!(f, "IDictionary<String,{}>", value),
            TypeRef::Grouping(key, element) => write!(f, "IGrouping<{},{}>", key, element),
            TypeRef::Function(params, ret) => {
                f.write_str("Func<")?;
                for param in params {
                    write!(f, "{},", param)?;
                }
                write!(f, "{}>", ret)
            }
        }
    }
}

impl From<TypeRef> for String {
    fn from(ty: TypeRef) -> String {
        ty.to_string()
    }
}

impl TryFrom<String> for TypeRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for TypeRef {
    type Err = String;

    /// Parses the textual forms produced by `Display`, plus the shorthands
    /// `T?` and `T[]`. Unknown names become `Structured`; schemas fix up
    /// enum names after loading.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty type name".to_string());
        }
        if let Some(inner) = s.strip_suffix('?') {
            return Ok(TypeRef::Nullable(Box::new(inner.parse()?)));
        }
        if let Some(inner) = s.strip_suffix("[]") {
            return Ok(TypeRef::array(inner.parse()?));
        }
        if let Some(open) = s.find('<') {
            let Some(body) = s[open + 1..].strip_suffix('>') else {
                return Err(format!("unbalanced generic type '{}'", s));
            };
            let head = &s[..open];
            let args = split_generic_args(body)
                .into_iter()
                .map(str::parse::<TypeRef>)
                .collect::<Result<Vec<_>, _>>()?;
            return match (head, args.as_slice()) {
                ("Nullable", [inner]) => Ok(TypeRef::Nullable(Box::new(inner.clone()))),
                ("IEnumerable" | "IList" | "ICollection" | "List" | "Array", [element]) => {
                    Ok(TypeRef::array(element.clone()))
                }
                ("IQueryable", [element]) => Ok(TypeRef::queryable(element.clone())),
                ("IDictionary" | "Dictionary", [value]) => Ok(TypeRef::dictionary(value.clone())),
                ("IDictionary" | "Dictionary", [TypeRef::String, value]) => {
                    Ok(TypeRef::dictionary(value.clone()))
                }
                ("IGrouping", [key, element]) => Ok(TypeRef::Grouping(
                    Box::new(key.clone()),
                    Box::new(element.clone()),
                )),
                _ => Err(format!("unsupported generic type '{}'", s)),
            };
        }
        Ok(TypeRef::intrinsic(s).unwrap_or_else(|| TypeRef::Structured(s.to_string())))
    }
}

fn split_generic_args(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in body.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(body[start..].trim());
    parts
}

#[test]
fn test_type_names_round_trip() {
    for text in [
        "Int32",
        "Nullable<Int32>",
        "IEnumerable<Weapon>",
        "IQueryable<Critter>",
        "IDictionary<String,Object>",
        "IGrouping<String,Critter>",
    ] {
        let ty: TypeRef = text.parse().unwrap();
        assert_eq!(ty.to_string(), text);
    }
    assert_eq!("int?".parse::<TypeRef>().unwrap(), TypeRef::Int32.nullable());
    assert_eq!(
        "Weapon[]".parse::<TypeRef>().unwrap(),
        TypeRef::array(TypeRef::structured("Weapon"))
    );
}
