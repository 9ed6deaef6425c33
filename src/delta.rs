//! Partial updates ("deltas") of collections, dictionaries and objects.
//!
//! A delta is written by the serializer as a patch payload and read back by
//! [`Deserializer::deserialize_patch`]. [`Delta::apply`] merges it onto a
//! baseline, which is what the receiving side of a PATCH does.
//!
//! [`Deserializer::deserialize_patch`]: crate::serialization::Deserializer::deserialize_patch

use indexmap::IndexMap;

use crate::{
    error::DeltaError,
    value::{Resource, Value},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    Collection(CollectionDelta),
    Dictionary(DictionaryDelta),
    Object(ObjectDelta),
}

impl Delta {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Delta::Collection(_) => "collection",
            Delta::Dictionary(_) => "dictionary",
            Delta::Object(_) => "object",
        }
    }

    /// Merges the delta onto `baseline`, returning the updated value.
    pub fn apply(&self, baseline: &Value) -> Result<Value, DeltaError> {
        match self {
            Delta::Collection(delta) => delta.apply(baseline),
            Delta::Dictionary(delta) => delta.apply(baseline),
            Delta::Object(delta) => delta.apply(baseline),
        }
    }
}

/// Added, modified and removed items of a collection.
///
/// Items are matched against the baseline by URI when both sides carry one,
/// otherwise by the properties the delta knows about (for items read off the
/// wire, that is the primary key).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectionDelta {
    pub added: Vec<Value>,
    pub modified: Vec<ObjectDelta>,
    pub removed: Vec<Value>,
    /// The baseline is discarded before `added` is applied. A cleared delta
    /// carries no removed or modified items.
    pub cleared: bool,
}

impl CollectionDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: impl Into<Value>) {
        self.added.push(item.into());
    }

    pub fn modify(&mut self, item: ObjectDelta) {
        self.modified.push(item);
    }

    pub fn remove(&mut self, item: impl Into<Value>) {
        let item = item.into();
        if let Some(index) = self.added.iter().position(|added| identifies(&item, added)) {
            self.added.remove(index);
            return;
        }
        if !self.cleared {
            self.removed.push(item);
        }
    }

    pub fn clear(&mut self) {
        self.cleared = true;
        self.added.clear();
        self.modified.clear();
        self.removed.clear();
    }

    pub fn is_empty(&self) -> bool {
        !self.cleared && self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    fn apply(&self, baseline: &Value) -> Result<Value, DeltaError> {
        let mut items = match baseline {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => {
                return Err(DeltaError::Mismatch {
                    delta: "collection",
                    found: other.kind_name(),
                });
            }
        };

        if self.cleared {
            items.clear();
        }

        items.retain(|item| !self.removed.iter().any(|removed| identifies(removed, item)));

        for modified in &self.modified {
            let key = Value::Resource(modified.original.clone());
            let slot = items
                .iter_mut()
                .find(|item| identifies(&key, item))
                .ok_or_else(|| DeltaError::ItemNotFound(describe_identity(&modified.original)))?;
            *slot = modified.apply(slot)?;
        }

        items.extend(self.added.iter().cloned());
        Ok(Value::Array(items))
    }
}

/// Modified (or added) and removed keys of a dictionary.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DictionaryDelta {
    pub modified: IndexMap<String, Value>,
    pub removed: Vec<String>,
    pub cleared: bool,
}

impl DictionaryDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        self.removed.retain(|removed| *removed != key);
        self.modified.insert(key, value.into());
    }

    pub fn remove(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.modified.shift_remove(&key);
        if !self.cleared && !self.removed.contains(&key) {
            self.removed.push(key);
        }
    }

    pub fn clear(&mut self) {
        self.cleared = true;
        self.modified.clear();
        self.removed.clear();
    }

    fn apply(&self, baseline: &Value) -> Result<Value, DeltaError> {
        let mut map = match baseline {
            Value::Dictionary(map) => map.clone(),
            Value::Null => IndexMap::new(),
            other => {
                return Err(DeltaError::Mismatch {
                    delta: "dictionary",
                    found: other.kind_name(),
                });
            }
        };

        if self.cleared {
            map.clear();
        }
        for key in &self.removed {
            map.shift_remove(key);
        }
        for (key, value) in &self.modified {
            let merged = merge(map.get(key), value)?;
            map.insert(key.clone(), merged);
        }
        Ok(Value::Dictionary(map))
    }
}

/// Changed properties of a structured value.
///
/// `original` identifies the object; it is the full baseline when the
/// delta was computed locally, and only the identifying properties when it
/// was read from a patch payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDelta {
    pub original: Resource,
    pub changes: IndexMap<String, Value>,
}

impl ObjectDelta {
    pub fn new(original: Resource) -> Self {
        ObjectDelta {
            original,
            changes: IndexMap::new(),
        }
    }

    /// Properties of `updated` that differ from `original`.
    pub fn diff(original: &Resource, updated: &Resource) -> Self {
        let changes = updated
            .properties
            .iter()
            .filter(|(name, value)| original.properties.get(name.as_str()) != Some(value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        ObjectDelta {
            original: original.clone(),
            changes,
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.changes.insert(name.into(), value.into());
    }

    pub fn type_name(&self) -> Option<&str> {
        self.original.type_name.as_deref()
    }

    pub fn uri(&self) -> Option<&str> {
        self.original.uri.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn apply(&self, baseline: &Value) -> Result<Value, DeltaError> {
        let mut target = match baseline {
            Value::Resource(resource) => resource.clone(),
            Value::Null => self.original.clone(),
            other => {
                return Err(DeltaError::Mismatch {
                    delta: "object",
                    found: other.kind_name(),
                });
            }
        };
        for (name, value) in &self.changes {
            let merged = merge(target.properties.get(name), value)?;
            target.properties.insert(name.clone(), merged);
        }
        Ok(Value::Resource(target))
    }
}

// Nested deltas patch the existing value; anything else replaces it.
fn merge(existing: Option<&Value>, incoming: &Value) -> Result<Value, DeltaError> {
    match incoming {
        Value::Delta(delta) => delta.apply(existing.unwrap_or(&Value::Null)),
        other => Ok(other.clone()),
    }
}

/// Whether `pattern` identifies `item`.
fn identifies(pattern: &Value, item: &Value) -> bool {
    let item_uri = match item {
        Value::Resource(resource) => resource.uri.as_deref(),
        Value::Reference(reference) => Some(reference.uri()),
        _ => None,
    };
    match pattern {
        Value::Resource(pattern) => {
            if let (Some(a), Some(b)) = (pattern.uri.as_deref(), item_uri) {
                return a == b;
            }
            let Value::Resource(item) = item else {
                return false;
            };
            !pattern.properties.is_empty()
                && pattern.properties.iter().all(|(name, value)| {
                    item.properties
                        .get(name)
                        .is_some_and(|other| other.loosely_equals(value))
                })
        }
        Value::Reference(reference) => item_uri == Some(reference.uri()),
        other => other.loosely_equals(item),
    }
}

fn describe_identity(resource: &Resource) -> String {
    if let Some(uri) = &resource.uri {
        return uri.clone();
    }
    let keys: Vec<String> = resource
        .properties
        .iter()
        .map(|(name, value)| format!("{}={}", name, value.as_string()))
        .collect();
    format!("{{{}}}", keys.join(", "))
}
