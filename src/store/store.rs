use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tracing::{debug, trace};

use crate::adapter::{default_adapter, StateAdapter};
use crate::observable::{Observable, Property, Subscription};

use super::config::{
    compile_reducer, resolve_input, CompiledReducer, ConfigError, Row, StateSource, SyncReducerFn,
};
use super::handlers::Handlers;

struct StoreCore {
    state: Value,
    // Set once the construction-time state is known. When the initial state
    // comes from a stream, the first emission latches it.
    latched: bool,
}

struct StoreShared {
    core: Mutex<StoreCore>,
    output: Property<Value>,
}

impl StoreShared {
    fn latch_initial(&self, value: &Value) {
        let mut core = self.core.lock().unwrap();
        if core.latched {
            return;
        }
        core.latched = true;
        core.state = value.clone();
        drop(core);
        self.output.set(value.clone());
    }

    fn apply_sync(&self, reduce: &SyncReducerFn, value: &Value) {
        if !self.output.is_active() {
            trace!("input dropped, store inactive");
            return;
        }
        let next = {
            let mut core = self.core.lock().unwrap();
            let next = reduce(&core.state, value);
            core.state = next.clone();
            next
        };
        self.output.set(next);
    }

    fn current(&self) -> Value {
        self.core.lock().unwrap().state.clone()
    }

    fn replace(&self, next: &Value) {
        self.core.lock().unwrap().state = next.clone();
        self.output.set(next.clone());
    }
}

/// A reactive reducer store: any number of `(input, reducer)` pairs folded
/// over one shared state.
///
/// Each input emission reduces the current state to the next state, which
/// becomes current before any other input observes it. The store is lazy:
/// while [`Store::stream`] has no subscribers, input events are dropped
/// without running a reducer.
///
/// # Examples
///
/// ```
/// use formwork::{Row, Store};
/// use serde_json::json;
///
/// let store = Store::new(
///     vec![Row::new("set_name", "name")],
///     json!({ "name": "" }),
/// )
/// .unwrap();
///
/// let state = store.stream();
/// let _watch = state.subscribe(|_| {});
///
/// store.handlers().call("set_name", json!("ada"));
/// assert_eq!(state.get(), json!({ "name": "ada" }));
/// ```
pub struct Store {
    shared: Arc<StoreShared>,
    handlers: Handlers,
    _subs: Vec<Subscription>,
    _retained: Vec<Observable<Value>>,
}

impl Store {
    /// Build a store from `(input, reducer)` rows with the default object
    /// adapter.
    pub fn new(rows: Vec<Row>, initial: impl Into<StateSource>) -> Result<Self, ConfigError> {
        Self::with_adapter(rows, initial, default_adapter())
    }

    /// Build a store with an explicit state adapter.
    pub fn with_adapter(
        rows: Vec<Row>,
        initial: impl Into<StateSource>,
        adapter: Arc<dyn StateAdapter>,
    ) -> Result<Self, ConfigError> {
        build(rows, initial.into(), adapter, &[])
    }

    /// The state property. Holds the current state; subscribing delivers it
    /// immediately, then every change.
    pub fn stream(&self) -> Property<Value> {
        self.shared.output.clone()
    }

    pub fn handlers(&self) -> &Handlers {
        &self.handlers
    }
}

pub(crate) fn build(
    rows: Vec<Row>,
    initial: StateSource,
    adapter: Arc<dyn StateAdapter>,
    reserved: &[&str],
) -> Result<Store, ConfigError> {
    let (initial_value, initial_stream) = match initial {
        StateSource::Value(Value::Null) => (adapter.empty(), None),
        StateSource::Value(value) => (value, None),
        StateSource::Stream(stream) => (adapter.empty(), Some(stream)),
    };

    let shared = Arc::new(StoreShared {
        core: Mutex::new(StoreCore {
            state: initial_value.clone(),
            latched: initial_stream.is_none(),
        }),
        output: Property::new(initial_value),
    });

    let mut handlers = Handlers::new();
    let mut seen = HashSet::new();
    let mut subs = Vec::new();
    let mut retained = Vec::new();

    if let Some(stream) = initial_stream {
        let weak = Arc::downgrade(&shared);
        subs.push(stream.subscribe(move |value| {
            if let Some(shared) = weak.upgrade() {
                shared.latch_initial(value);
            }
        }));
        retained.push(stream);
    }

    for row in rows {
        let resolved = resolve_input(row.input, reserved, &mut seen)?;
        if let Some((name, handler)) = resolved.handler {
            handlers.insert(name, handler);
        }

        match compile_reducer(row.reducer, &adapter)? {
            CompiledReducer::Sync(reduce) => {
                let weak = Arc::downgrade(&shared);
                subs.push(resolved.stream.subscribe(move |value| {
                    if let Some(shared) = weak.upgrade() {
                        shared.apply_sync(&reduce, value);
                    }
                }));
            }
            CompiledReducer::Stream(stream_reducer) => {
                let weak = Arc::downgrade(&shared);
                subs.push(stream_reducer.output.subscribe(move |next| {
                    if let Some(shared) = weak.upgrade() {
                        shared.replace(next);
                    }
                }));
                retained.push(stream_reducer.output);

                let pairs = stream_reducer.pairs;
                let weak: Weak<StoreShared> = Arc::downgrade(&shared);
                subs.push(resolved.stream.subscribe(move |value| {
                    if let Some(shared) = weak.upgrade() {
                        if !shared.output.is_active() {
                            trace!("input dropped, store inactive");
                            return;
                        }
                        let state = shared.current();
                        pairs.emit((state, value.clone()));
                    }
                }));
            }
        }

        retained.push(resolved.stream);
    }

    debug!(handlers = handlers.len(), "store built");

    Ok(Store {
        shared,
        handlers,
        _subs: subs,
        _retained: retained,
    })
}
