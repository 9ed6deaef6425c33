//! OData-like filter language, typed query trees and a delta-aware JSON wire
//! format.
//!
//! Filter text such as `hat.hattype eq 'whatever'` is lexed, parsed, and
//! bound against a [`schema::TypeMapper`] into a typed [`expr::Expr`] lambda.
//! Query operator calls on such trees are recognised as
//! [`query::QueryExpression`]s, rewritten with [`rewrite`], executed in
//! memory with [`evaluator::Evaluator`], and their results written and read
//! with the [`serialization`] module.

pub mod ast;
pub mod binder;
#[cfg(feature = "cli")]
pub mod cli;
pub mod delta;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod lexer;
pub mod parser;
pub mod proxy;
pub mod query;
pub mod rewrite;
pub mod schema;
pub mod serialization;
pub mod types;
pub mod value;

pub use binder::{QueryParser, parse_filter, parse_select_list};
pub use delta::Delta;
pub use error::{
    DeltaError, ProxyError, QueryError, QueryParseError, RewriteError, SerializationError,
};
pub use evaluator::{EvalContext, EvalError, Evaluator};
pub use expr::{Expr, ExprRef, Lambda, Parameter};
pub use lexer::{Lexer, Position};
pub use parser::Parser;
pub use query::QueryExpression;
pub use rewrite::{RecursiveRewriteVisitor, TreePatternMatcher};
pub use schema::{Schema, TypeMapper, TypeResolver};
pub use serialization::{Deserializer, ExpandPaths, QueryResult, Serializer, SerializerOptions};
pub use types::{SerializationMode, TypeRef};
pub use value::{Resource, Value};
