use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::adapter::StateAdapter;
use crate::observable::{Observable, Subject};

use super::handlers::Handler;

/// A malformed field configuration, surfaced synchronously at construction —
/// never at runtime.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid reducer: {0}")]
    InvalidReducer(String),

    #[error(
        "incomplete validation config for field '{0}': \
         unless the reducer is a property name, the validator needs explicit get/set/key options"
    )]
    IncompleteValidationConfig(String),

    #[error("handler name '{0}' is reserved")]
    ReservedHandlerName(String),

    #[error("handler '{0}' already exists")]
    DuplicateHandlerName(String),
}

type InitFn = Arc<dyn Fn(Observable<Value>) -> Observable<Value> + Send + Sync>;

/// Where a field's events come from.
pub enum Input {
    /// A named handler; calling it emits into the field.
    Named(String),
    /// An external event stream; no handler is created.
    Stream(Observable<Value>),
    /// A named handler merged with an external stream.
    NamedMerged(String, Observable<Value>),
    /// A named handler whose stream is post-processed before the store
    /// (and validation) observes it.
    NamedComposed(String, InitFn),
}

impl Input {
    pub fn named(name: impl Into<String>) -> Self {
        Input::Named(name.into())
    }

    pub fn stream(stream: Observable<Value>) -> Self {
        Input::Stream(stream)
    }

    pub fn named_merged(name: impl Into<String>, stream: Observable<Value>) -> Self {
        Input::NamedMerged(name.into(), stream)
    }

    pub fn composed(
        name: impl Into<String>,
        init: impl Fn(Observable<Value>) -> Observable<Value> + Send + Sync + 'static,
    ) -> Self {
        Input::NamedComposed(name.into(), Arc::new(init))
    }
}

impl From<&str> for Input {
    fn from(name: &str) -> Self {
        Input::Named(name.to_string())
    }
}

impl From<String> for Input {
    fn from(name: String) -> Self {
        Input::Named(name)
    }
}

impl From<Observable<Value>> for Input {
    fn from(stream: Observable<Value>) -> Self {
        Input::Stream(stream)
    }
}

pub type SyncReducerFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;
pub type StreamReducerFn =
    Arc<dyn Fn(Observable<(Value, Value)>) -> Observable<Value> + Send + Sync>;

/// How a field's events fold into state.
pub enum Reducer {
    /// Shorthand: store the value under this property via the adapter.
    Named(String),
    /// A plain `(state, value) -> state` function.
    Sync(SyncReducerFn),
    /// Escape hatch for batched/async reducers: receives the `(state, value)`
    /// pair stream and produces a stream of resulting states.
    Stream(StreamReducerFn),
}

impl Reducer {
    pub fn named(name: impl Into<String>) -> Self {
        Reducer::Named(name.into())
    }

    pub fn sync(f: impl Fn(&Value, &Value) -> Value + Send + Sync + 'static) -> Self {
        Reducer::Sync(Arc::new(f))
    }

    pub fn stream(
        f: impl Fn(Observable<(Value, Value)>) -> Observable<Value> + Send + Sync + 'static,
    ) -> Self {
        Reducer::Stream(Arc::new(f))
    }
}

impl From<&str> for Reducer {
    fn from(name: &str) -> Self {
        Reducer::Named(name.to_string())
    }
}

impl From<String> for Reducer {
    fn from(name: String) -> Self {
        Reducer::Named(name)
    }
}

/// One `(input, reducer)` pair of the store engine.
pub struct Row {
    pub(crate) input: Input,
    pub(crate) reducer: Reducer,
}

impl Row {
    pub fn new(input: impl Into<Input>, reducer: impl Into<Reducer>) -> Self {
        Self {
            input: input.into(),
            reducer: reducer.into(),
        }
    }
}

/// Initial state: a plain value, or a stream whose first emission is frozen
/// as the construction-time value.
pub enum StateSource {
    Value(Value),
    Stream(Observable<Value>),
}

impl Default for StateSource {
    fn default() -> Self {
        StateSource::Value(Value::Null)
    }
}

impl From<Value> for StateSource {
    fn from(value: Value) -> Self {
        StateSource::Value(value)
    }
}

impl From<Observable<Value>> for StateSource {
    fn from(stream: Observable<Value>) -> Self {
        StateSource::Stream(stream)
    }
}

// --- construction-time resolution

pub(crate) struct ResolvedInput {
    pub(crate) stream: Observable<Value>,
    pub(crate) handler: Option<(String, Handler)>,
}

pub(crate) fn resolve_input(
    input: Input,
    reserved: &[&str],
    seen: &mut HashSet<String>,
) -> Result<ResolvedInput, ConfigError> {
    let check_name = |name: String, seen: &mut HashSet<String>| -> Result<String, ConfigError> {
        if name.is_empty() {
            return Err(ConfigError::InvalidInput(
                "handler name must not be empty".to_string(),
            ));
        }
        if reserved.contains(&name.as_str()) {
            return Err(ConfigError::ReservedHandlerName(name));
        }
        if !seen.insert(name.clone()) {
            return Err(ConfigError::DuplicateHandlerName(name));
        }
        Ok(name)
    };

    match input {
        Input::Named(name) => {
            let name = check_name(name, seen)?;
            let subject = Subject::new();
            Ok(ResolvedInput {
                stream: subject.observable(),
                handler: Some((name, Handler::new(subject))),
            })
        }
        Input::Stream(stream) => Ok(ResolvedInput {
            stream,
            handler: None,
        }),
        Input::NamedMerged(name, external) => {
            let name = check_name(name, seen)?;
            let subject = Subject::new();
            Ok(ResolvedInput {
                stream: subject.observable().merge(&external),
                handler: Some((name, Handler::new(subject))),
            })
        }
        Input::NamedComposed(name, init) => {
            let name = check_name(name, seen)?;
            let subject = Subject::new();
            Ok(ResolvedInput {
                stream: init(subject.observable()),
                handler: Some((name, Handler::new(subject))),
            })
        }
    }
}

pub(crate) enum CompiledReducer {
    Sync(SyncReducerFn),
    Stream(StreamReducer),
}

pub(crate) struct StreamReducer {
    pub(crate) pairs: Subject<(Value, Value)>,
    pub(crate) output: Observable<Value>,
}

pub(crate) fn compile_reducer(
    reducer: Reducer,
    adapter: &Arc<dyn StateAdapter>,
) -> Result<CompiledReducer, ConfigError> {
    match reducer {
        Reducer::Named(prop) => {
            if prop.is_empty() {
                return Err(ConfigError::InvalidReducer(
                    "property name must not be empty".to_string(),
                ));
            }
            let adapter = Arc::clone(adapter);
            Ok(CompiledReducer::Sync(Arc::new(move |state, value| {
                adapter.set(state, &prop, value.clone())
            })))
        }
        Reducer::Sync(f) => Ok(CompiledReducer::Sync(f)),
        Reducer::Stream(f) => {
            let pairs = Subject::new();
            let output = f(pairs.observable());
            Ok(CompiledReducer::Stream(StreamReducer { pairs, output }))
        }
    }
}
