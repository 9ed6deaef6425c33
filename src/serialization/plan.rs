//! Per-type write plans and their shared cache.
//!
//! A plan is the flattened, ordered property list of a structured type with
//! wire keys and serialization modes already worked out. Scalar properties
//! in a plan are written straight from the value, skipping node creation;
//! the output is identical to the generic path.

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;
use tracing::debug;

use crate::{
    error::SerializationError,
    schema::TypeMapper,
    serialization::names::escape_key,
    types::{SerializationMode, TypeRef},
};

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedProperty {
    /// Declared name, as used in [`Resource::properties`](crate::value::Resource).
    pub name: String,
    /// Unescaped JSON name.
    pub json_name: String,
    /// Escaped key as written.
    pub key: String,
    /// Segment in dotted expand paths.
    pub expand_name: String,
    pub ty: TypeRef,
    pub mode: SerializationMode,
    pub always_expand: bool,
    pub primary_key: bool,
}

impl PlannedProperty {
    /// Scalar properties with a concrete static type need no `_type` boxing
    /// and no node of their own.
    pub fn is_simple(&self) -> bool {
        self.mode == SerializationMode::Value && self.ty.underlying() != &TypeRef::Object
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WritePlan {
    pub type_name: String,
    pub properties: Vec<PlannedProperty>,
    by_json_name: HashMap<String, usize>,
}

impl WritePlan {
    pub fn build(type_name: &str, mapper: &dyn TypeMapper) -> Result<WritePlan, SerializationError> {
        if mapper.class_mapping(type_name).is_none() {
            return Err(SerializationError::UnknownType(type_name.to_string()));
        }

        let properties: Vec<PlannedProperty> = mapper
            .properties(type_name)
            .into_iter()
            .map(|spec| {
                let json_name = spec.json_name();
                PlannedProperty {
                    name: spec.name.clone(),
                    key: escape_key(&json_name).into_owned(),
                    json_name,
                    expand_name: spec.expand_name(),
                    mode: mapper.serialization_mode(&spec.property_type),
                    ty: spec.property_type.clone(),
                    always_expand: spec.always_expand,
                    primary_key: spec.primary_key,
                }
            })
            .collect();

        let by_json_name = properties
            .iter()
            .enumerate()
            .map(|(index, p)| (p.json_name.clone(), index))
            .collect();

        Ok(WritePlan {
            type_name: type_name.to_string(),
            properties,
            by_json_name,
        })
    }

    pub fn property(&self, name: &str) -> Option<&PlannedProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Exact match first, then case-insensitive.
    pub fn by_json_name(&self, json_name: &str) -> Option<&PlannedProperty> {
        match self.by_json_name.get(json_name) {
            Some(&index) => self.properties.get(index),
            None => self
                .properties
                .iter()
                .find(|p| p.json_name.eq_ignore_ascii_case(json_name)),
        }
    }

    pub fn primary_key(&self) -> Option<&PlannedProperty> {
        self.properties.iter().find(|p| p.primary_key)
    }
}

/// Concurrent get-or-build cache of write plans, keyed by type name.
///
/// Construct one per mapper and share it across threads. Building the same
/// plan twice under contention is harmless; the first insert wins.
#[derive(Debug, Default)]
pub struct WritePlanCache {
    plans: DashMap<String, Arc<WritePlan>>,
}

impl WritePlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &self,
        type_name: &str,
        mapper: &dyn TypeMapper,
    ) -> Result<Arc<WritePlan>, SerializationError> {
        if let Some(plan) = self.plans.get(type_name) {
            return Ok(plan.value().clone());
        }

        debug!(type_name, "write plan cache miss");
        let plan = Arc::new(WritePlan::build(type_name, mapper)?);
        let entry = self
            .plans
            .entry(type_name.to_string())
            .or_insert(plan);
        Ok(entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn clear(&self) {
        self.plans.clear();
    }
}
