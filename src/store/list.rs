use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::adapter::default_adapter;

use super::config::{ConfigError, Reducer, SyncReducerFn};

/// A reducer over list state.
///
/// The input is an object `{ "query": .., "data": .. }`; the inner reducer
/// runs with `data` on every item matching `query`, and non-matching items
/// pass through untouched. A string inner reducer writes `data` under that
/// property of the item, through the default adapter.
///
/// Query matching: an object matches items carrying every given key/value
/// pair, a string matches items whose value under that key is truthy, and
/// anything else matches items equal to it.
///
/// # Examples
///
/// ```
/// use formwork::{list_reducer, Row, Store};
/// use serde_json::json;
///
/// let store = Store::new(
///     vec![Row::new("toggle", list_reducer("done").unwrap())],
///     json!([
///         { "id": 1, "done": false },
///         { "id": 2, "done": false },
///     ]),
/// )
/// .unwrap();
/// let state = store.stream();
/// let _watch = state.subscribe(|_| {});
///
/// store
///     .handlers()
///     .call("toggle", json!({ "query": { "id": 2 }, "data": true }));
/// assert_eq!(state.get()[1]["done"], json!(true));
/// ```
pub fn list_reducer(inner: impl Into<Reducer>) -> Result<Reducer, ConfigError> {
    let reduce = item_reducer(inner.into())?;
    Ok(Reducer::Sync(Arc::new(move |state, input| {
        let (Some(query), Some(data)) = (input.get("query"), input.get("data")) else {
            debug!("list input without query/data ignored");
            return state.clone();
        };
        let Value::Array(items) = state else {
            debug!("list reducer over non-array state ignored");
            return state.clone();
        };
        Value::Array(
            items
                .iter()
                .map(|item| {
                    if query_matches(query, item) {
                        reduce(item, data)
                    } else {
                        item.clone()
                    }
                })
                .collect(),
        )
    })))
}

fn item_reducer(inner: Reducer) -> Result<SyncReducerFn, ConfigError> {
    match inner {
        Reducer::Named(prop) => {
            if prop.is_empty() {
                return Err(ConfigError::InvalidReducer(
                    "property name must not be empty".to_string(),
                ));
            }
            let adapter = default_adapter();
            Ok(Arc::new(move |item, value| {
                adapter.set(item, &prop, value.clone())
            }))
        }
        Reducer::Sync(f) => Ok(f),
        Reducer::Stream(_) => Err(ConfigError::InvalidReducer(
            "list reducer requires a property name or a sync function".to_string(),
        )),
    }
}

fn query_matches(query: &Value, item: &Value) -> bool {
    match query {
        Value::Object(fields) => fields.iter().all(|(key, value)| item.get(key) == Some(value)),
        Value::String(key) => item.get(key.as_str()).map_or(false, truthy),
        other => other == item,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
