//! JSON wire format.
//!
//! Structured objects carry a `_type` discriminator when their dynamic type
//! differs from the static one and a `_uri` when they have identity.
//! Resources that are not expanded travel as `{"_ref": uri}` markers;
//! a client reads those back as lazy proxies, a server as stubs.
//!
//! Deltas use marker prefixes on keys: `*@id` for a modified collection
//! item, `-@id` for a removed one, `-key` for a removed dictionary key and
//! `!prop` for a property replaced wholesale. Names that start with a
//! reserved character are escaped with `^`.

pub mod context;
pub mod deserializer;
pub mod names;
pub mod node;
pub mod plan;
pub mod serializer;
pub mod writer;

pub use context::{
    ClientDeserializationContext, DeserializationContext, ExpandPaths, SerializationContext,
    ServerDeserializationContext, ServerSerializationContext,
};
pub use deserializer::Deserializer;
pub use plan::{WritePlan, WritePlanCache};
pub use serializer::{MAX_DEPTH, Serializer};
pub use writer::JsonWriter;

use crate::value::Value;

/// One page of query results, written as a `__result__` envelope.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    /// Matches before paging.
    pub total_count: i64,
    pub items: Vec<Value>,
    pub previous: Option<String>,
    pub next: Option<String>,
    pub debug_info: Option<Value>,
}

impl QueryResult {
    pub fn new(items: Vec<Value>) -> Self {
        QueryResult {
            total_count: items.len() as i64,
            items,
            ..Default::default()
        }
    }
}

/// Knobs shared by the CLI and embedders.
#[derive(Debug, Clone, Default)]
pub struct SerializerOptions {
    pub pretty: bool,
    pub expand: ExpandPaths,
}
