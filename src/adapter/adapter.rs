use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};

/// Get/set/empty/equality primitives over an opaque state value.
///
/// String shorthands in field configuration ("use property `name` as the
/// reducer") resolve through the adapter, so a custom adapter can back a
/// store with any representation it can express inside a [`Value`].
pub trait StateAdapter: Send + Sync {
    /// The state a store starts from when none is supplied.
    fn empty(&self) -> Value;

    /// Read a named field out of the state.
    fn get(&self, state: &Value, key: &str) -> Value;

    /// Write a named field, returning the next state. Must not mutate.
    fn set(&self, state: &Value, key: &str, value: Value) -> Value;

    /// State equality, used to decide whether an emission changed state.
    fn equals(&self, a: &Value, b: &Value) -> bool {
        a == b
    }
}

/// The default adapter: state is a JSON object, fields are its keys.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObjectAdapter;

impl StateAdapter for ObjectAdapter {
    fn empty(&self) -> Value {
        Value::Object(Map::new())
    }

    fn get(&self, state: &Value, key: &str) -> Value {
        state.get(key).cloned().unwrap_or(Value::Null)
    }

    fn set(&self, state: &Value, key: &str, value: Value) -> Value {
        let mut map = match state {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        map.insert(key.to_string(), value);
        Value::Object(map)
    }
}

pub(crate) fn default_adapter() -> Arc<dyn StateAdapter> {
    static DEFAULT: OnceLock<Arc<ObjectAdapter>> = OnceLock::new();
    Arc::clone(DEFAULT.get_or_init(|| Arc::new(ObjectAdapter))) as Arc<dyn StateAdapter>
}
