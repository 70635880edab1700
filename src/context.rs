use serde_json::{Map, Value};
use std::borrow::Cow;
use std::rc::Rc;

use crate::path;

/// Key under which request-level data (query parameters, route params) lives.
pub const SYS_KEY: &str = "_sys";

/// Immutable data context handed down the directive walk.
///
/// Scope boundaries never mutate a context; `with` and `merged` build a new one
/// that only the narrowed subtree sees. Cloning is an `Rc` bump.
#[derive(Debug, Clone)]
pub struct DataContext {
    root: Rc<Value>,
}

impl Default for DataContext {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl DataContext {
    /// Wrap `value` as a context. Anything other than an object becomes an
    /// empty context.
    pub fn new(value: Value) -> Self {
        let root = match value {
            Value::Object(_) => value,
            _ => Value::Object(Map::new()),
        };
        Self {
            root: Rc::new(root),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self::new(Value::Object(map))
    }

    pub fn value(&self) -> &Value {
        &self.root
    }

    pub fn contains(&self, key: &str) -> bool {
        self.root
            .as_object()
            .map(|map| map.contains_key(key))
            .unwrap_or(false)
    }

    pub fn get(&self, path: &str) -> Option<Cow<'_, Value>> {
        path::get(&self.root, path, false)
    }

    pub fn get_sequence(&self, path: &str) -> Option<Cow<'_, Value>> {
        path::get(&self.root, path, true)
    }

    /// Query parameter from the `_sys.query` namespace.
    pub fn query_param(&self, name: &str) -> Option<&Value> {
        self.root.get(SYS_KEY)?.get("query")?.get(name)
    }

    /// A new context with `key` set to `value`.
    pub fn with(&self, key: &str, value: Value) -> Self {
        let mut map = self.to_map();
        map.insert(key.to_string(), value);
        Self::from_map(map)
    }

    /// A new context with every entry of `entries` layered on top.
    pub fn merged(&self, entries: Map<String, Value>) -> Self {
        if entries.is_empty() {
            return self.clone();
        }
        let mut map = self.to_map();
        map.extend(entries);
        Self::from_map(map)
    }

    pub fn to_map(&self) -> Map<String, Value> {
        self.root.as_object().cloned().unwrap_or_default()
    }
}

impl From<Value> for DataContext {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
