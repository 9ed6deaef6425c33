//! CLI support for plume-query
//!
//! Provides programmatic access to the `plume` subcommands so they can be
//! embedded in other tools and exercised from tests.

mod check;
mod normalize;
mod select;

pub use check::{CheckOptions, CheckResult, execute_check};
pub use normalize::{NormalizeOptions, execute_normalize};
pub use select::{SelectOptions, execute_select};

use std::{fs, io, path::Path};

use thiserror::Error;

use crate::{
    error::{QueryParseError, SerializationError},
    evaluator::EvalError,
    schema::{Schema, TypeMapper},
    types::TypeRef,
};

/// Errors that can occur during CLI operations
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Parse(#[from] QueryParseError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Invalid schema: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unknown type '{0}'")]
    UnknownType(String),

    #[error("No input provided. Use --input or pipe JSON to stdin.")]
    NoInput,
}

/// Reads a schema document, or an empty schema when no path is given.
pub fn load_schema(path: Option<&Path>) -> Result<Schema, CliError> {
    match path {
        Some(path) => Ok(Schema::from_json(&fs::read_to_string(path)?)?),
        None => Ok(Schema::new()),
    }
}

/// Resolves a `--root` argument such as `Critter` or `Critter[]`.
pub fn resolve_root(schema: &Schema, name: &str) -> Result<TypeRef, CliError> {
    if let Some(ty) = schema.resolve_type_name(name.trim()) {
        return Ok(ty);
    }
    if let Some(element) = name.trim().strip_suffix("[]") {
        return resolve_root(schema, element).map(TypeRef::array);
    }
    Err(CliError::UnknownType(name.to_string()))
}
