//! Parse select lists into projection lambdas

use super::CliError;
use crate::{binder::parse_select_list, schema::Schema, types::TypeRef};

/// Options for the select command
#[derive(Debug, Clone)]
pub struct SelectOptions {
    /// Select list, e.g. `name, hat.hattype as hat`
    pub list: String,
    pub root: TypeRef,
    /// Project into an anonymous record instead of a dictionary
    pub anonymous: bool,
}

/// Binds the select list and renders the projection together with its
/// result type.
pub fn execute_select(schema: &Schema, options: &SelectOptions) -> Result<String, CliError> {
    let projection = parse_select_list(schema, &options.root, &options.list, options.anonymous)?;
    let result_type = match projection.as_lambda() {
        Some(lambda) => lambda.return_type(),
        None => projection.ty(),
    };
    Ok(format!("{}\n: {}", projection, result_type))
}
