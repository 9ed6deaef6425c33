use std::{cell::Cell, sync::Arc};

use chrono::SecondsFormat;
use tracing::{error, trace};

use crate::{
    delta::{CollectionDelta, Delta, DictionaryDelta, ObjectDelta},
    error::SerializationError,
    schema::TypeMapper,
    serialization::{
        QueryResult,
        context::SerializationContext,
        names::{
            BOXED_VALUE_KEY, KeyMarker, REF_KEY, RESULT_TYPE, TYPE_KEY, URI_KEY, escape_key,
            marked_key,
        },
        node::SerializerNode,
        plan::{WritePlan, WritePlanCache},
        writer::JsonWriter,
    },
    types::{SerializationMode, TypeRef},
    value::{Resource, Value},
};

/// Nesting depth at which serialization gives up. Reaching it means an
/// unbounded structure, not a large one.
pub const MAX_DEPTH: usize = 300;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Per-thread nesting counter, decremented on drop.
struct DepthGuard;

impl DepthGuard {
    fn enter() -> Result<DepthGuard, SerializationError> {
        let depth = DEPTH.with(|d| {
            let next = d.get() + 1;
            d.set(next);
            next
        });
        if depth > MAX_DEPTH {
            DEPTH.with(|d| d.set(d.get() - 1));
            error!(limit = MAX_DEPTH, "serialization recursion limit reached");
            return Err(SerializationError::RecursionLimit(MAX_DEPTH));
        }
        Ok(DepthGuard)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

struct WriteState {
    writer: JsonWriter,
    /// URIs of resources currently being written, outermost first.
    visiting: Vec<String>,
}

/// Type-directed JSON serializer.
///
/// The serialization mode of each node's dynamic type picks the branch:
/// scalars (boxed with `_type` when the static type is `Object`), arrays,
/// string-keyed dictionaries, or structured objects. Resources are written
/// as `_ref` markers when the context says so, or when they are already
/// being written further up (cycles).
pub struct Serializer<'c> {
    context: &'c dyn SerializationContext,
    plans: Option<&'c WritePlanCache>,
    pretty: bool,
}

impl<'c> Serializer<'c> {
    pub fn new(context: &'c dyn SerializationContext) -> Self {
        Serializer {
            context,
            plans: None,
            pretty: false,
        }
    }

    /// Reuses write plans across calls and threads.
    pub fn with_plans(mut self, plans: &'c WritePlanCache) -> Self {
        self.plans = Some(plans);
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn mapper(&self) -> &dyn TypeMapper {
        self.context.mapper()
    }

    fn plan(&self, type_name: &str) -> Result<Arc<WritePlan>, SerializationError> {
        match self.plans {
            Some(cache) => cache.get_or_build(type_name, self.mapper()),
            None => WritePlan::build(type_name, self.mapper()).map(Arc::new),
        }
    }

    fn state(&self) -> WriteState {
        WriteState {
            writer: JsonWriter::new(self.pretty),
            visiting: Vec::new(),
        }
    }

    /// Serializes `value` whose static type is `expected`.
    pub fn serialize(&self, value: &Value, expected: &TypeRef) -> Result<String, SerializationError> {
        trace!(expected = %expected, "serializing value");
        let mut state = self.state();
        let node = SerializerNode::root(value, expected.clone());
        self.write_node(&node, &mut state)?;
        Ok(state.writer.finish())
    }

    /// Serializes a query result envelope; each item is written as a root.
    pub fn serialize_result(
        &self,
        result: &QueryResult,
        element_type: &TypeRef,
    ) -> Result<String, SerializationError> {
        let mut state = self.state();
        state.writer.begin_object();
        state.writer.key(TYPE_KEY);
        state.writer.string(RESULT_TYPE);
        state.writer.key("totalCount");
        state.writer.integer(result.total_count);
        state.writer.key("count");
        state.writer.integer(result.items.len() as i64);
        if let Some(previous) = &result.previous {
            state.writer.key("previous");
            state.writer.string(previous);
        }
        if let Some(next) = &result.next {
            state.writer.key("next");
            state.writer.string(next);
        }
        state.writer.key("items");
        state.writer.begin_array();
        for item in &result.items {
            let node = SerializerNode::root(item, element_type.clone());
            self.write_node(&node, &mut state)?;
        }
        state.writer.end_array();
        if let Some(debug_info) = &result.debug_info {
            state.writer.key("debugInfo");
            let node = SerializerNode::root(debug_info, TypeRef::dictionary(TypeRef::Object));
            self.write_node(&node, &mut state)?;
        }
        state.writer.end_object();
        Ok(state.writer.finish())
    }

    fn write_node<'v>(
        &self,
        node: &SerializerNode<'v>,
        state: &mut WriteState,
    ) -> Result<(), SerializationError> {
        let _guard = DepthGuard::enter()?;

        match node.value {
            Value::Null => {
                state.writer.null();
                return Ok(());
            }
            Value::Delta(delta) => return self.write_delta(node, delta, state),
            Value::Reference(reference) => {
                return self.write_reference(node, reference.uri(), state);
            }
            Value::List(list) => return self.write_reference(node, list.uri(), state),
            _ => {}
        }

        if let Some(uri) = &node.uri
            && (self.context.serialize_as_reference(node) || is_visiting(node, state))
        {
            return self.write_reference(node, uri, state);
        }

        match node.mode(self.mapper()) {
            SerializationMode::Value => self.write_value(node, state),
            SerializationMode::Array => self.write_array(node, state),
            SerializationMode::Dictionary => self.write_dictionary(node, state),
            SerializationMode::Structured => self.write_structured(node, state),
        }
    }

    fn write_reference(
        &self,
        node: &SerializerNode<'_>,
        uri: &str,
        state: &mut WriteState,
    ) -> Result<(), SerializationError> {
        let writer = &mut state.writer;
        writer.begin_object();
        writer.key(REF_KEY);
        writer.string(uri);
        if node.mode(self.mapper()) == SerializationMode::Structured && node.needs_type_tag() {
            writer.key(TYPE_KEY);
            writer.string(&node.value_type.wire_name());
        }
        writer.end_object();
        Ok(())
    }

    fn write_value(
        &self,
        node: &SerializerNode<'_>,
        state: &mut WriteState,
    ) -> Result<(), SerializationError> {
        if node.expected_type.underlying() == &TypeRef::Object && node.needs_type_tag() {
            state.writer.begin_object();
            state.writer.key(TYPE_KEY);
            state.writer.string(&node.value_type.wire_name());
            state.writer.key(BOXED_VALUE_KEY);
            write_scalar(&mut state.writer, node.value)?;
            state.writer.end_object();
            return Ok(());
        }
        write_scalar(&mut state.writer, node.value)
    }

    fn write_array<'v>(
        &self,
        node: &SerializerNode<'v>,
        state: &mut WriteState,
    ) -> Result<(), SerializationError> {
        let items = match node.value {
            Value::Array(items) => items,
            other => return Err(unsupported(other, SerializationMode::Array)),
        };
        let element_type = element_type_of(&node.value_type);

        state.writer.begin_array();
        for item in items {
            self.write_node(&node.item(item, element_type.clone()), state)?;
        }
        state.writer.end_array();
        Ok(())
    }

    fn write_dictionary<'v>(
        &self,
        node: &SerializerNode<'v>,
        state: &mut WriteState,
    ) -> Result<(), SerializationError> {
        let map = match node.value {
            Value::Dictionary(map) => map,
            other => return Err(unsupported(other, SerializationMode::Dictionary)),
        };
        let value_type = dictionary_value_type(&node.value_type);

        state.writer.begin_object();
        for (key, value) in map {
            state.writer.key(&escape_key(key));
            let child = node.property(value, key, &key.to_lowercase(), value_type.clone(), false);
            self.write_node(&child, state)?;
        }
        state.writer.end_object();
        Ok(())
    }

    fn write_structured<'v>(
        &self,
        node: &SerializerNode<'v>,
        state: &mut WriteState,
    ) -> Result<(), SerializationError> {
        match node.value {
            Value::Resource(resource) => self.write_resource(node, resource, state),
            Value::Grouping { key, items } => {
                let (key_type, element_type) = match &node.value_type {
                    TypeRef::Grouping(key, element) => ((**key).clone(), (**element).clone()),
                    _ => (TypeRef::Object, TypeRef::Object),
                };
                state.writer.begin_object();
                state.writer.key("key");
                self.write_node(&node.property(key, "key", "key", key_type, false), state)?;
                state.writer.key("items");
                state.writer.begin_array();
                for item in items {
                    self.write_node(&node.item(item, element_type.clone()), state)?;
                }
                state.writer.end_array();
                state.writer.end_object();
                Ok(())
            }
            other => Err(unsupported(other, SerializationMode::Structured)),
        }
    }

    fn write_resource<'v>(
        &self,
        node: &SerializerNode<'v>,
        resource: &'v Resource,
        state: &mut WriteState,
    ) -> Result<(), SerializationError> {
        if let Some(uri) = &resource.uri {
            state.visiting.push(uri.clone());
        }

        state.writer.begin_object();
        if let Some(uri) = &resource.uri {
            state.writer.key(URI_KEY);
            state.writer.string(uri);
        }
        if node.needs_type_tag() {
            state.writer.key(TYPE_KEY);
            state.writer.string(&node.value_type.wire_name());
        }

        match &node.value_type {
            TypeRef::Structured(type_name) => {
                let plan = self.plan(type_name)?;
                if let Some(unknown) = resource
                    .properties
                    .keys()
                    .find(|name| plan.property(name).is_none())
                {
                    return Err(SerializationError::UnknownProperty {
                        type_name: type_name.clone(),
                        property: unknown.clone(),
                    });
                }

                for property in &plan.properties {
                    let Some(value) = resource.properties.get(&property.name) else {
                        continue;
                    };
                    state.writer.key(&property.key);
                    if property.is_simple() && !matches!(value, Value::Delta(_)) {
                        write_scalar(&mut state.writer, value)?;
                    } else {
                        let child = node.property(
                            value,
                            &property.json_name,
                            &property.expand_name,
                            property.ty.clone(),
                            property.always_expand,
                        );
                        self.write_node(&child, state)?;
                    }
                }
            }
            value_type => {
                let fields = match value_type {
                    TypeRef::Anonymous(fields) => fields.as_slice(),
                    _ => &[],
                };
                for (name, value) in &resource.properties {
                    let ty = fields
                        .iter()
                        .find(|(field, _)| field == name)
                        .map(|(_, ty)| ty.clone())
                        .unwrap_or(TypeRef::Object);
                    state.writer.key(&escape_key(name));
                    let child = node.property(value, name, &name.to_lowercase(), ty, false);
                    self.write_node(&child, state)?;
                }
            }
        }

        state.writer.end_object();
        if resource.uri.is_some() {
            state.visiting.pop();
        }
        Ok(())
    }

    fn write_delta<'v>(
        &self,
        node: &SerializerNode<'v>,
        delta: &'v Delta,
        state: &mut WriteState,
    ) -> Result<(), SerializationError> {
        match delta {
            Delta::Object(object) => {
                self.write_object_delta(node, &node.value_type, object, KeyMarker::Plain, state)
            }
            Delta::Collection(collection) => self.write_collection_delta(node, collection, state),
            Delta::Dictionary(dictionary) => self.write_dictionary_delta(node, dictionary, state),
        }
    }

    /// Changed properties only. Inside a collection delta (`marker` is
    /// `Modified`) the item is identified by a `*@id` key instead of `_uri`.
    fn write_object_delta<'v>(
        &self,
        node: &SerializerNode<'v>,
        hint: &TypeRef,
        delta: &'v ObjectDelta,
        marker: KeyMarker,
        state: &mut WriteState,
    ) -> Result<(), SerializationError> {
        let type_name = match (delta.type_name(), hint.underlying()) {
            (Some(name), _) => name.to_string(),
            (None, TypeRef::Structured(name)) => name.clone(),
            (None, _) => return Err(SerializationError::MissingType),
        };
        let plan = self.plan(&type_name)?;

        if let Some(unknown) = delta
            .changes
            .keys()
            .find(|name| plan.property(name).is_none())
        {
            return Err(SerializationError::UnknownProperty {
                type_name,
                property: unknown.clone(),
            });
        }

        state.writer.begin_object();
        if marker == KeyMarker::Plain {
            if let Some(uri) = delta.uri() {
                state.writer.key(URI_KEY);
                state.writer.string(uri);
            }
        } else {
            let key = plan
                .primary_key()
                .ok_or_else(|| SerializationError::MissingPrimaryKey(type_name.clone()))?;
            let id = delta
                .original
                .properties
                .get(&key.name)
                .or_else(|| delta.changes.get(&key.name))
                .ok_or_else(|| SerializationError::MissingPrimaryKey(type_name.clone()))?;
            state
                .writer
                .key(&format!("{}@{}", marker.prefix(), key.json_name));
            write_scalar(&mut state.writer, id)?;
        }

        for property in &plan.properties {
            let Some(value) = delta.changes.get(&property.name) else {
                continue;
            };
            if marker != KeyMarker::Plain && property.primary_key {
                continue;
            }

            // A non-delta container value under a delta replaces wholesale.
            let replace = match value {
                Value::Delta(inner) => match inner.as_ref() {
                    Delta::Collection(c) => c.cleared,
                    Delta::Dictionary(d) => d.cleared,
                    Delta::Object(_) => false,
                },
                Value::Null => false,
                _ => property.mode != SerializationMode::Value,
            };
            if replace {
                state
                    .writer
                    .key(&marked_key(KeyMarker::Replace, &property.json_name));
            } else {
                state.writer.key(&property.key);
            }

            let child = node.property(
                value,
                &property.json_name,
                &property.expand_name,
                property.ty.clone(),
                property.always_expand,
            );
            self.write_node(&child, state)?;
        }

        state.writer.end_object();
        Ok(())
    }

    /// Added items in full, then modified (`*@id`) and removed (`-@id`)
    /// items. A cleared delta is just its added items.
    fn write_collection_delta<'v>(
        &self,
        node: &SerializerNode<'v>,
        delta: &'v CollectionDelta,
        state: &mut WriteState,
    ) -> Result<(), SerializationError> {
        let element_type = element_type_of(&node.value_type);

        state.writer.begin_array();
        for item in &delta.added {
            self.write_node(&node.item(item, element_type.clone()), state)?;
        }
        for item in &delta.modified {
            let _guard = DepthGuard::enter()?;
            self.write_object_delta(node, &element_type, item, KeyMarker::Modified, state)?;
        }
        for item in &delta.removed {
            self.write_removed_item(item, &element_type, state)?;
        }
        state.writer.end_array();
        Ok(())
    }

    fn write_removed_item(
        &self,
        item: &Value,
        element_type: &TypeRef,
        state: &mut WriteState,
    ) -> Result<(), SerializationError> {
        let (type_name, properties) = match (item, element_type.underlying()) {
            (Value::Resource(resource), hint) => {
                let name = match (&resource.type_name, hint) {
                    (Some(name), _) => name.clone(),
                    (None, TypeRef::Structured(name)) => name.clone(),
                    (None, _) => return Err(SerializationError::MissingType),
                };
                (name, &resource.properties)
            }
            (other, _) => return Err(unsupported(other, SerializationMode::Structured)),
        };
        let plan = self.plan(&type_name)?;
        let key = plan
            .primary_key()
            .ok_or_else(|| SerializationError::MissingPrimaryKey(type_name.clone()))?;
        let id = properties
            .get(&key.name)
            .ok_or_else(|| SerializationError::MissingPrimaryKey(type_name.clone()))?;

        state.writer.begin_object();
        state
            .writer
            .key(&format!("{}@{}", KeyMarker::Removed.prefix(), key.json_name));
        write_scalar(&mut state.writer, id)?;
        state.writer.end_object();
        Ok(())
    }

    /// Modified keys with their values, removed keys as `"-key": {}`.
    fn write_dictionary_delta<'v>(
        &self,
        node: &SerializerNode<'v>,
        delta: &'v DictionaryDelta,
        state: &mut WriteState,
    ) -> Result<(), SerializationError> {
        let value_type = dictionary_value_type(&node.value_type);

        state.writer.begin_object();
        for (key, value) in &delta.modified {
            state.writer.key(&escape_key(key));
            let child = node.property(value, key, &key.to_lowercase(), value_type.clone(), false);
            self.write_node(&child, state)?;
        }
        for key in &delta.removed {
            state.writer.key(&marked_key(KeyMarker::Removed, key));
            state.writer.empty_object();
        }
        state.writer.end_object();
        Ok(())
    }
}

fn is_visiting(node: &SerializerNode<'_>, state: &WriteState) -> bool {
    match node.value {
        Value::Resource(resource) => resource
            .uri
            .as_ref()
            .is_some_and(|uri| state.visiting.contains(uri)),
        _ => false,
    }
}

fn element_type_of(ty: &TypeRef) -> TypeRef {
    ty.element_type().cloned().unwrap_or(TypeRef::Object)
}

fn dictionary_value_type(ty: &TypeRef) -> TypeRef {
    match ty {
        TypeRef::Dictionary(value) => (**value).clone(),
        _ => TypeRef::Object,
    }
}

fn unsupported(value: &Value, mode: SerializationMode) -> SerializationError {
    SerializationError::Unsupported {
        value: value.kind_name(),
        mode: mode.to_string(),
    }
}

fn write_scalar(writer: &mut JsonWriter, value: &Value) -> Result<(), SerializationError> {
    match value {
        Value::Null => writer.null(),
        Value::Boolean(b) => writer.boolean(*b),
        Value::Integer(n) => writer.integer(*n),
        Value::Float(n) => writer.float(*n),
        Value::Decimal(d) => writer.decimal(*d),
        Value::String(s) => writer.string(s),
        Value::Guid(g) => writer.string(&g.hyphenated().to_string()),
        Value::DateTime(d) => writer.string(&d.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        Value::Type(t) => writer.string(&t.to_string()),
        other => return Err(unsupported(other, SerializationMode::Value)),
    }
    Ok(())
}
