//! Error types shared across the crate.
//!
//! Every failure surface is a typed enum so callers can match on the exact
//! kind (a recursion-limit abort is not the same thing as a malformed
//! payload). None of these are retried internally.

use thiserror::Error;

use crate::lexer::Position;

/// A grammar or resolution failure while parsing query text.
///
/// The `Display` form is a tested contract: the header line is followed by
/// the offending source line and a caret line (`|/`) under the failing
/// column.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Error on line {line} character {column} of query: {message}\n{diagram}")]
pub struct QueryParseError {
    /// 1-based line of the offending token.
    pub line: usize,
    /// 1-based column of the offending token.
    pub column: usize,
    /// Human readable reason.
    pub message: String,
    /// Two-line diagram: the source line, then spaces ending in `|/`.
    pub diagram: String,
}

impl QueryParseError {
    pub fn new(source: &str, position: Position, message: impl Into<String>) -> Self {
        let line_text = source.lines().nth(position.line.saturating_sub(1)).unwrap_or("");
        let diagram = format!(
            "{}\n{}|/",
            line_text,
            " ".repeat(position.column.saturating_sub(1))
        );
        QueryParseError {
            line: position.line,
            column: position.column,
            message: message.into(),
            diagram,
        }
    }
}

/// Invalid arguments handed to a query operator factory.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("{operator}: source of type {found} is not a sequence")]
    NotASequence { operator: &'static str, found: String },

    #[error("{operator}: expected a lambda with {expected} parameter(s)")]
    LambdaArity { operator: &'static str, expected: usize },

    #[error("{operator}: lambda parameter type {found} does not match element type {expected}")]
    ParameterType {
        operator: &'static str,
        expected: String,
        found: String,
    },

    #[error("{operator}: predicate must return Boolean, found {found}")]
    NotAPredicate { operator: &'static str, found: String },

    #[error("{operator}: {message}")]
    InvalidArgument { operator: &'static str, message: String },
}

/// Failures raised by rewriters and the tree pattern matcher.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RewriteError {
    #[error("pattern matching is not implemented for node kind {0}")]
    Unimplemented(&'static str),

    #[error("rewriting did not reach a fixed point within {0} iterations")]
    NoFixedPoint(usize),

    #[error("capture mismatch: {0}")]
    CaptureMismatch(String),

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Failures while encoding or decoding the JSON wire format.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("unexpected JSON for {expected}: found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("type '{found}' is not assignable to expected type '{expected}'")]
    IncompatibleType { expected: String, found: String },

    #[error("unknown property '{property}' on type '{type_name}'")]
    UnknownProperty { type_name: String, property: String },

    #[error("missing _type discriminator and no expected type was given")]
    MissingType,

    #[error("value of type '{0}' has no _uri and cannot be written as a reference")]
    MissingUri(String),

    #[error("type '{0}' has no primary key; cannot encode a delta item")]
    MissingPrimaryKey(String),

    #[error("recursion limit of {0} reached during serialization")]
    RecursionLimit(usize),

    #[error("value of kind {value} cannot be written as {mode}")]
    Unsupported { value: &'static str, mode: String },

    #[error("reference error: {0}")]
    Reference(#[from] ProxyError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of lazy proxies and client-side collections.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProxyError {
    #[error("not allowed to modify a server-backed lazy list ({0})")]
    ReadOnly(&'static str),

    #[error("failed to fetch '{uri}': {message}")]
    Fetch { uri: String, message: String },

    #[error("index {index} out of range for list of length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("fetched value for '{0}' is not a resource")]
    NotAResource(String),
}

/// Failures applying a delta onto a baseline value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeltaError {
    #[error("cannot apply a {delta} delta to a {found} value")]
    Mismatch { delta: &'static str, found: &'static str },

    #[error("no item in the baseline matches modified item {0}")]
    ItemNotFound(String),
}
