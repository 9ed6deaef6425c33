//! Parse filters against a schema and optionally run them over JSON input

use tracing::debug;

use super::CliError;
use crate::{
    binder::parse_filter,
    evaluator::Evaluator,
    schema::Schema,
    serialization::{
        Deserializer, ExpandPaths, Serializer, ServerDeserializationContext,
        ServerSerializationContext,
    },
    types::TypeRef,
    value::Value,
};

/// Options for the check command
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Filter text, e.g. `hat.hattype eq 'whatever'`
    pub filter: String,
    /// Type the filter is bound against
    pub root: TypeRef,
    /// JSON array of root items to filter
    pub input: Option<String>,
    pub pretty: bool,
}

/// Result of a check operation
#[derive(Debug, Clone, PartialEq)]
pub enum CheckResult {
    /// The bound predicate, rendered as a lambda
    Parsed(String),
    /// Items of the input that satisfy the filter, as wire JSON
    Filtered(String),
}

/// Execute a check operation
pub fn execute_check(schema: &Schema, options: &CheckOptions) -> Result<CheckResult, CliError> {
    let predicate = parse_filter(schema, &options.root, &options.filter)?;
    let Some(input) = &options.input else {
        return Ok(CheckResult::Parsed(predicate.to_string()));
    };

    let items_type = TypeRef::array(options.root.clone());
    let deserialization = ServerDeserializationContext::new(schema);
    let items = Deserializer::new(&deserialization).deserialize(input, Some(&items_type))?;
    let items = items.as_items().unwrap_or_default();

    let matches = Evaluator::with_mapper(schema).filter(&predicate, items)?;
    debug!(total = items.len(), matched = matches.len(), "filter applied");

    let serialization = ServerSerializationContext::new(schema, ExpandPaths::all());
    let output = Serializer::new(&serialization)
        .pretty(options.pretty)
        .serialize(&Value::Array(matches), &items_type)?;
    Ok(CheckResult::Filtered(output))
}
