use std::collections::BTreeMap;

use serde_json::Value;
use tracing::trace;

use crate::observable::Subject;

/// The emit handle created for a named input. Calling it pushes a value into
/// the field's event stream.
#[derive(Clone)]
pub struct Handler {
    subject: Subject<Value>,
}

impl Handler {
    pub(crate) fn new(subject: Subject<Value>) -> Self {
        Self { subject }
    }

    pub fn call(&self, value: impl Into<Value>) {
        self.subject.emit(value.into());
    }
}

/// All named handlers of a store, keyed by the configured input name.
#[derive(Clone, Default)]
pub struct Handlers {
    map: BTreeMap<String, Handler>,
}

impl Handlers {
    pub(crate) fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: String, handler: Handler) {
        self.map.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.map.get(name)
    }

    /// Call a handler by name. Returns `false` when no such handler exists.
    pub fn call(&self, name: &str, value: impl Into<Value>) -> bool {
        match self.map.get(name) {
            Some(handler) => {
                trace!(handler = name, "handler called");
                handler.call(value);
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
