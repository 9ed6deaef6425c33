//! Lazy stand-ins for related resources, and client-side write buffers.
//!
//! A `_ref` marker on the wire becomes a [`LazyReference`] (single entity)
//! or a [`LazyList`] (collection). Neither fetches anything until asked to:
//! the first `resolve()` goes through the [`ResourceFetcher`] and caches the
//! result, later calls reuse it until `invalidate()` drops the cache.

use std::{fmt, sync::Arc};

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use tracing::debug;

use crate::{
    error::ProxyError,
    value::{Resource, Value},
};

/// Client handle used to fetch a resource or collection by URI.
///
/// Fetching is the only blocking operation in the crate.
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, uri: &str) -> Result<Value, ProxyError>;
}

struct ReferenceInner {
    uri: String,
    type_name: Option<String>,
    client: Arc<dyn ResourceFetcher>,
    cached: RwLock<Option<Resource>>,
}

/// Proxy for a single resource that has not been fetched yet.
///
/// Clones share the cache.
#[derive(Clone)]
pub struct LazyReference {
    inner: Arc<ReferenceInner>,
}

impl LazyReference {
    pub fn new(
        uri: impl Into<String>,
        type_name: Option<String>,
        client: Arc<dyn ResourceFetcher>,
    ) -> Self {
        LazyReference {
            inner: Arc::new(ReferenceInner {
                uri: uri.into(),
                type_name,
                client,
                cached: RwLock::new(None),
            }),
        }
    }

    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    /// Type named by the `_type` next to `_ref`, if any.
    pub fn type_name(&self) -> Option<&str> {
        self.inner.type_name.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.cached.read().is_some()
    }

    /// The target resource, fetched on first use.
    pub fn resolve(&self) -> Result<Resource, ProxyError> {
        if let Some(resource) = self.inner.cached.read().as_ref() {
            return Ok(resource.clone());
        }

        let mut cached = self.inner.cached.write();
        // Another thread may have won the race for the write lock.
        if let Some(resource) = cached.as_ref() {
            return Ok(resource.clone());
        }

        debug!(uri = %self.inner.uri, "fetching lazy reference");
        let resource = match self.inner.client.fetch(&self.inner.uri)? {
            Value::Resource(mut resource) => {
                if resource.uri.is_none() {
                    resource.uri = Some(self.inner.uri.clone());
                }
                resource
            }
            _ => return Err(ProxyError::NotAResource(self.inner.uri.clone())),
        };
        *cached = Some(resource.clone());
        Ok(resource)
    }

    /// Reads one property, fetching the target first if needed.
    pub fn get(&self, property: &str) -> Result<Value, ProxyError> {
        let resource = self.resolve()?;
        Ok(resource.get(property).cloned().unwrap_or(Value::Null))
    }

    /// Drops the cached target; the next access fetches again.
    pub fn invalidate(&self) {
        if self.inner.cached.write().take().is_some() {
            debug!(uri = %self.inner.uri, "invalidated lazy reference");
        }
    }
}

impl fmt::Debug for LazyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyReference")
            .field("uri", &self.inner.uri)
            .field("type_name", &self.inner.type_name)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl PartialEq for LazyReference {
    fn eq(&self, other: &Self) -> bool {
        self.inner.uri == other.inner.uri && self.inner.type_name == other.inner.type_name
    }
}

struct ListInner {
    uri: String,
    client: Arc<dyn ResourceFetcher>,
    cached: RwLock<Option<Arc<Vec<Value>>>>,
}

/// Read-only proxy for a server-backed collection.
///
/// Reads fetch on first use. Every mutating call fails with
/// [`ProxyError::ReadOnly`].
#[derive(Clone)]
pub struct LazyList {
    inner: Arc<ListInner>,
}

impl LazyList {
    pub fn new(uri: impl Into<String>, client: Arc<dyn ResourceFetcher>) -> Self {
        LazyList {
            inner: Arc::new(ListInner {
                uri: uri.into(),
                client,
                cached: RwLock::new(None),
            }),
        }
    }

    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.cached.read().is_some()
    }

    fn load(&self) -> Result<Arc<Vec<Value>>, ProxyError> {
        if let Some(items) = self.inner.cached.read().as_ref() {
            return Ok(items.clone());
        }

        let mut cached = self.inner.cached.write();
        if let Some(items) = cached.as_ref() {
            return Ok(items.clone());
        }

        debug!(uri = %self.inner.uri, "fetching lazy list");
        let items = match self.inner.client.fetch(&self.inner.uri)? {
            Value::Array(items) => Arc::new(items),
            other => {
                return Err(ProxyError::Fetch {
                    uri: self.inner.uri.clone(),
                    message: format!("expected a collection, got {}", other.kind_name()),
                });
            }
        };
        *cached = Some(items.clone());
        Ok(items)
    }

    /// All items, fetched on first use.
    pub fn resolve(&self) -> Result<Vec<Value>, ProxyError> {
        Ok(self.load()?.as_ref().clone())
    }

    pub fn len(&self) -> Result<usize, ProxyError> {
        Ok(self.load()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, ProxyError> {
        Ok(self.load()?.is_empty())
    }

    pub fn get(&self, index: usize) -> Result<Value, ProxyError> {
        let items = self.load()?;
        items.get(index).cloned().ok_or(ProxyError::OutOfRange {
            index,
            len: items.len(),
        })
    }

    pub fn invalidate(&self) {
        if self.inner.cached.write().take().is_some() {
            debug!(uri = %self.inner.uri, "invalidated lazy list");
        }
    }

    pub fn push(&self, _item: Value) -> Result<(), ProxyError> {
        Err(ProxyError::ReadOnly("Add"))
    }

    pub fn insert(&self, _index: usize, _item: Value) -> Result<(), ProxyError> {
        Err(ProxyError::ReadOnly("Insert"))
    }

    pub fn set(&self, _index: usize, _item: Value) -> Result<(), ProxyError> {
        Err(ProxyError::ReadOnly("set_Item"))
    }

    pub fn remove(&self, _item: &Value) -> Result<bool, ProxyError> {
        Err(ProxyError::ReadOnly("Remove"))
    }

    pub fn remove_at(&self, _index: usize) -> Result<Value, ProxyError> {
        Err(ProxyError::ReadOnly("RemoveAt"))
    }

    pub fn clear(&self) -> Result<(), ProxyError> {
        Err(ProxyError::ReadOnly("Clear"))
    }
}

impl fmt::Debug for LazyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyList")
            .field("uri", &self.inner.uri)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl PartialEq for LazyList {
    fn eq(&self, other: &Self) -> bool {
        self.inner.uri == other.inner.uri
    }
}

/// Property values of a create/update form that has not been submitted.
///
/// Tracks which properties were touched so the payload includes them even
/// when they hold a default or empty value.
#[derive(Debug, Clone, Default)]
pub struct PostForm {
    type_name: String,
    values: IndexMap<String, Value>,
    dirty: IndexSet<String>,
}

impl PostForm {
    pub fn new(type_name: impl Into<String>) -> Self {
        PostForm {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        self.values.insert(name.clone(), value.into());
        self.dirty.insert(name);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.dirty.contains(name)
    }

    pub fn dirty_properties(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    fn mark_dirty(&mut self, name: &str) {
        if !self.dirty.contains(name) {
            self.dirty.insert(name.to_string());
        }
    }

    /// Mutable list view over a collection property.
    pub fn list(&mut self, name: impl Into<String>) -> PostResourceList<'_> {
        PostResourceList {
            form: self,
            name: name.into(),
        }
    }

    /// Mutable dictionary view over a dictionary property.
    pub fn dictionary(&mut self, name: impl Into<String>) -> PostResourceDictionary<'_> {
        PostResourceDictionary {
            form: self,
            name: name.into(),
        }
    }

    /// The payload to submit: every dirty property, in first-touched order.
    pub fn to_resource(&self) -> Resource {
        let mut resource = Resource::new(self.type_name.clone());
        for name in &self.dirty {
            let value = self.values.get(name).cloned().unwrap_or(Value::Null);
            resource.properties.insert(name.clone(), value);
        }
        resource
    }
}

/// Collection property of a [`PostForm`]; every mutation marks it dirty.
pub struct PostResourceList<'a> {
    form: &'a mut PostForm,
    name: String,
}

impl PostResourceList<'_> {
    fn edit<R>(&mut self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        self.form.mark_dirty(&self.name);
        let slot = self.form.values.entry(self.name.clone()).or_insert(Value::Null);
        let mut items = match std::mem::replace(slot, Value::Null) {
            Value::Array(items) => items,
            _ => Vec::new(),
        };
        let result = f(&mut items);
        *slot = Value::Array(items);
        result
    }

    fn items(&self) -> &[Value] {
        match self.form.values.get(&self.name) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items().get(index)
    }

    pub fn push(&mut self, item: impl Into<Value>) {
        let item = item.into();
        self.edit(|items| items.push(item));
    }

    pub fn insert(&mut self, index: usize, item: impl Into<Value>) -> Result<(), ProxyError> {
        let item = item.into();
        self.edit(|items| {
            if index > items.len() {
                return Err(ProxyError::OutOfRange {
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, item);
            Ok(())
        })
    }

    pub fn set(&mut self, index: usize, item: impl Into<Value>) -> Result<(), ProxyError> {
        let item = item.into();
        self.edit(|items| {
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(ProxyError::OutOfRange { index, len })?;
            *slot = item;
            Ok(())
        })
    }

    pub fn remove(&mut self, item: &Value) -> bool {
        self.edit(|items| match items.iter().position(|existing| existing == item) {
            Some(index) => {
                items.remove(index);
                true
            }
            None => false,
        })
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Value, ProxyError> {
        self.edit(|items| {
            if index >= items.len() {
                return Err(ProxyError::OutOfRange {
                    index,
                    len: items.len(),
                });
            }
            Ok(items.remove(index))
        })
    }

    pub fn clear(&mut self) {
        self.edit(Vec::clear);
    }
}

/// Dictionary property of a [`PostForm`]; every mutation marks it dirty.
pub struct PostResourceDictionary<'a> {
    form: &'a mut PostForm,
    name: String,
}

impl PostResourceDictionary<'_> {
    fn edit<R>(&mut self, f: impl FnOnce(&mut IndexMap<String, Value>) -> R) -> R {
        self.form.mark_dirty(&self.name);
        let slot = self.form.values.entry(self.name.clone()).or_insert(Value::Null);
        let mut map = match std::mem::replace(slot, Value::Null) {
            Value::Dictionary(map) => map,
            _ => IndexMap::new(),
        };
        let result = f(&mut map);
        *slot = Value::Dictionary(map);
        result
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self.form.values.get(&self.name) {
            Some(Value::Dictionary(map)) => map.get(key),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let (key, value) = (key.into(), value.into());
        self.edit(|map| map.insert(key, value))
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.edit(|map| map.shift_remove(key))
    }

    pub fn clear(&mut self) {
        self.edit(IndexMap::clear);
    }
}
