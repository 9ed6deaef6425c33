//! Read wire JSON against a schema and write it back out

use super::CliError;
use crate::{
    schema::Schema,
    serialization::{
        Deserializer, Serializer, SerializerOptions, ServerDeserializationContext,
        ServerSerializationContext,
    },
    types::TypeRef,
    value::Value,
};

/// Options for the normalize command
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    pub input: String,
    /// Expected type of the document; inferred from `_type` when absent
    pub root: Option<TypeRef>,
    /// Expand paths and layout of the output
    pub output: SerializerOptions,
}

/// Round-trips `input` through the deserializer and serializer, applying
/// the expand paths on the way out.
pub fn execute_normalize(schema: &Schema, options: &NormalizeOptions) -> Result<String, CliError> {
    let deserialization = ServerDeserializationContext::new(schema);
    let value = Deserializer::new(&deserialization).deserialize(&options.input, options.root.as_ref())?;

    let ty = options
        .root
        .clone()
        .or_else(|| value.runtime_type())
        .unwrap_or(TypeRef::Object);
    let ty = match (&value, &ty) {
        (Value::Array(_), TypeRef::Object) => TypeRef::array(TypeRef::Object),
        _ => ty,
    };

    let serialization = ServerSerializationContext::new(schema, options.output.expand.clone());
    Ok(Serializer::new(&serialization)
        .pretty(options.output.pretty)
        .serialize(&value, &ty)?)
}
