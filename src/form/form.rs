use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use serde_json::Value;
use tracing::{debug, trace};

use crate::adapter::{default_adapter, StateAdapter};
use crate::observable::{Observable, Property, Subject, Subscription};
use crate::store::{
    compile_reducer, resolve_input, CompiledReducer, ConfigError, Handler, Handlers, StateSource,
};

use super::config::{CombineErrorsFn, CombineStateFn, Field, FormOptions, MapErrorsFn};
use super::field::{CompiledField, CompiledValidator, FieldReducer};
use super::status::{all_null, ErrorMap, FormSnapshot, Status};
use super::validator::{run_validator, Validation, ValidatorFn};

/// The future returned by the `validate` and `reset` handlers. Resolves with
/// the snapshot of the emission carrying the corresponding status flag; while
/// a pass is in flight, repeated calls share it.
pub type SnapshotFuture = Shared<oneshot::Receiver<FormSnapshot>>;

const RESERVED: &[&str] = &["validate", "reset"];

/// One whole-form validation pass. Results are collected here and merged
/// into the error map in a single step when the last validator answers.
struct ValidatePass {
    serial: u64,
    pending: HashSet<String>,
    results: ErrorMap,
    sender: Option<oneshot::Sender<FormSnapshot>>,
}

struct FormCore {
    state: Value,
    errors: ErrorMap,
    // False until any field emits or a validation runs; drives the
    // None-until-interaction lifecycle of `is_valid`.
    interacted: bool,
    initial: Value,
    latched: bool,
    fields: Vec<CompiledField>,
    passes: Vec<ValidatePass>,
    next_serial: u64,
    pending_validate: Option<(u64, SnapshotFuture)>,
    reset_latest: Option<Value>,
}

struct FormShared {
    core: Mutex<FormCore>,
    output: Property<FormSnapshot>,
    adapter: Arc<dyn StateAdapter>,
    map_errors: Option<MapErrorsFn>,
    reset_combine: Option<CombineStateFn>,
}

// Emissions, future resolutions and pair feeds collected while the core lock
// is held, applied after it is released. Keeps every transition atomic
// without calling user code under the lock.
#[derive(Default)]
struct Effects {
    emit: Option<FormSnapshot>,
    resolve: Vec<(oneshot::Sender<FormSnapshot>, FormSnapshot)>,
    feed: Vec<(Subject<(Value, Value)>, (Value, Value))>,
}

fn run_effects(shared: &FormShared, effects: Effects) {
    if let Some(snapshot) = effects.emit {
        shared.output.set(snapshot);
    }
    for (sender, snapshot) in effects.resolve {
        let _ = sender.send(snapshot);
    }
    for (pairs, pair) in effects.feed {
        pairs.emit(pair);
    }
}

impl FormShared {
    fn snapshot(&self, core: &FormCore, is_validated: bool, is_resetted: bool) -> FormSnapshot {
        let errors = match &self.map_errors {
            Some(map) => map(&core.errors),
            None => core.errors.clone(),
        };
        let is_valid = if core.interacted {
            Some(all_null(&errors))
        } else {
            None
        };
        FormSnapshot {
            state: core.state.clone(),
            errors,
            status: Status {
                is_valid,
                is_validated,
                is_resetted,
            },
        }
    }

    /// Apply the field's primary reducer for an accepted value.
    fn reduce_main(&self, core: &mut FormCore, idx: usize, raw: &Value, effects: &mut Effects) {
        match &core.fields[idx].reducer {
            FieldReducer::Sync(reduce) => {
                let reduce = Arc::clone(reduce);
                let prev = core.state.clone();
                core.state = reduce(&prev, raw);
                if !self.adapter.equals(&prev, &core.state) {
                    core.pending_validate = None;
                }
                effects.emit = Some(self.snapshot(core, false, false));
            }
            FieldReducer::Stream(pairs) => {
                // The next state (and its emission) arrives through the
                // reducer's output stream.
                let pairs = pairs.clone();
                effects
                    .feed
                    .push((pairs, (core.state.clone(), raw.clone())));
            }
        }
    }

    fn handle_input(self: &Arc<Self>, idx: usize, value: &Value) {
        let mut effects = Effects::default();
        let validated = {
            let mut core = self.core.lock().unwrap();
            if !self.output.is_active() {
                trace!(field = idx, "input dropped, form inactive");
                return;
            }
            core.interacted = true;
            let run = core.fields[idx]
                .validator
                .as_ref()
                .map(|validator| Arc::clone(&validator.run));
            match run {
                Some(run) => {
                    let seq = core.fields[idx].issue_seq();
                    let state = core.state.clone();
                    Some((run, seq, state))
                }
                None => {
                    self.reduce_main(&mut core, idx, value, &mut effects);
                    None
                }
            }
        };
        run_effects(self, effects);

        if let Some((run, seq, state)) = validated {
            trace!(field = idx, seq, "validating input");
            match run_validator(&run, value, &state) {
                Validation::Ready(error) => self.on_field_result(idx, seq, value, error),
                Validation::Pending(promise) => {
                    let weak = Arc::downgrade(self);
                    let raw = value.clone();
                    promise.on_settle(move |result| {
                        if let Some(shared) = weak.upgrade() {
                            let error = match result {
                                Ok(value) => value,
                                Err(message) => Value::String(message),
                            };
                            shared.on_field_result(idx, seq, &raw, error);
                        }
                    });
                }
            }
        }
    }

    /// A validation verdict for one input event. Only the verdict matching
    /// the field's latest input is accepted; anything older is stale.
    fn on_field_result(self: &Arc<Self>, idx: usize, seq: u64, raw: &Value, error: Value) {
        let mut effects = Effects::default();
        {
            let mut core = self.core.lock().unwrap();
            if core.fields[idx].latest_input != seq {
                debug!(field = idx, seq, "stale validation result discarded");
                return;
            }
            let Some(key) = core.fields[idx]
                .validator
                .as_ref()
                .map(|validator| validator.key.clone())
            else {
                return;
            };
            if error.is_null() {
                core.errors.insert(key, Value::Null);
                self.reduce_main(&mut core, idx, raw, &mut effects);
            } else {
                // Store the raw value so controlled inputs stay in sync; the
                // primary reducer is skipped.
                let set = core.fields[idx]
                    .validator
                    .as_ref()
                    .map(|validator| Arc::clone(&validator.set));
                if let Some(set) = set {
                    let prev = core.state.clone();
                    core.state = set(&prev, raw);
                    if !self.adapter.equals(&prev, &core.state) {
                        core.pending_validate = None;
                    }
                }
                core.errors.insert(key, error);
                effects.emit = Some(self.snapshot(&core, false, false));
            }
        }
        run_effects(self, effects);
    }

    /// A state produced by a stream reducer's output.
    fn handle_reduced_state(self: &Arc<Self>, next: &Value) {
        let mut effects = Effects::default();
        {
            let mut core = self.core.lock().unwrap();
            core.interacted = true;
            let prev = core.state.clone();
            core.state = next.clone();
            if !self.adapter.equals(&prev, &core.state) {
                core.pending_validate = None;
            }
            effects.emit = Some(self.snapshot(&core, false, false));
        }
        run_effects(self, effects);
    }

    fn start_validate(self: &Arc<Self>) -> SnapshotFuture {
        let mut effects = Effects::default();
        let mut work: Vec<(String, ValidatorFn, Value, Value)> = Vec::new();
        let mut started = None;
        let future = {
            let mut core = self.core.lock().unwrap();
            if let Some((_, future)) = &core.pending_validate {
                trace!("validate already in flight");
                return future.clone();
            }
            let (sender, receiver) = oneshot::channel();
            let future = receiver.shared();
            core.next_serial += 1;
            let serial = core.next_serial;
            core.interacted = true;

            for field in &core.fields {
                if let Some(validator) = &field.validator {
                    work.push((
                        validator.key.clone(),
                        Arc::clone(&validator.run),
                        (validator.get)(&core.state),
                        core.state.clone(),
                    ));
                }
            }

            if work.is_empty() {
                // A form without validators still answers validate().
                let snapshot = self.snapshot(&core, true, false);
                effects.emit = Some(snapshot.clone());
                effects.resolve.push((sender, snapshot));
            } else {
                core.passes.push(ValidatePass {
                    serial,
                    pending: work.iter().map(|(key, ..)| key.clone()).collect(),
                    results: ErrorMap::new(),
                    sender: Some(sender),
                });
                core.pending_validate = Some((serial, future.clone()));
                started = Some(serial);
            }
            future
        };
        run_effects(self, effects);

        if let Some(serial) = started {
            debug!(serial, validators = work.len(), "validation pass started");
            for (key, run, value, state) in work {
                match run_validator(&run, &value, &state) {
                    Validation::Ready(error) => self.on_pass_result(serial, &key, error),
                    Validation::Pending(promise) => {
                        let weak = Arc::downgrade(self);
                        promise.on_settle(move |result| {
                            if let Some(shared) = weak.upgrade() {
                                let error = match result {
                                    Ok(value) => value,
                                    Err(message) => Value::String(message),
                                };
                                shared.on_pass_result(serial, &key, error);
                            }
                        });
                    }
                }
            }
        }
        future
    }

    fn on_pass_result(self: &Arc<Self>, serial: u64, key: &str, error: Value) {
        let mut effects = Effects::default();
        {
            let mut core = self.core.lock().unwrap();
            let Some(pos) = core.passes.iter().position(|pass| pass.serial == serial) else {
                debug!(serial, key, "result for finished validation pass discarded");
                return;
            };
            let finished = {
                let pass = &mut core.passes[pos];
                pass.pending.remove(key);
                pass.results.insert(key.to_string(), error);
                pass.pending.is_empty()
            };
            if finished {
                let mut pass = core.passes.remove(pos);
                for (key, error) in std::mem::take(&mut pass.results) {
                    core.errors.insert(key, error);
                }
                if matches!(&core.pending_validate, Some((s, _)) if *s == serial) {
                    core.pending_validate = None;
                }
                let snapshot = self.snapshot(&core, true, false);
                effects.emit = Some(snapshot.clone());
                if let Some(sender) = pass.sender.take() {
                    effects.resolve.push((sender, snapshot));
                }
            }
        }
        run_effects(self, effects);
    }

    fn start_reset(self: &Arc<Self>) -> SnapshotFuture {
        let mut effects = Effects::default();
        let (sender, receiver) = oneshot::channel();
        let future = receiver.shared();
        {
            let mut core = self.core.lock().unwrap();
            trace!("form reset");
            // In-flight validations for old inputs must not land after reset.
            for field in &mut core.fields {
                field.bump();
            }
            core.errors.clear();
            core.interacted = false;
            core.pending_validate = None;
            core.state = match (&self.reset_combine, &core.reset_latest) {
                (Some(combine), Some(latest)) => combine(&core.initial, latest),
                _ => core.initial.clone(),
            };
            let snapshot = self.snapshot(&core, false, true);
            effects.emit = Some(snapshot.clone());
            effects.resolve.push((sender, snapshot));
        }
        run_effects(self, effects);
        future
    }

    fn on_external(self: &Arc<Self>, combine: &CombineErrorsFn, external: &ErrorMap) {
        let mut effects = Effects::default();
        {
            let mut core = self.core.lock().unwrap();
            core.interacted = true;
            core.errors = combine(&core.errors, external);
            effects.emit = Some(self.snapshot(&core, false, false));
        }
        run_effects(self, effects);
    }

    fn on_reset_latest(&self, value: &Value) {
        self.core.lock().unwrap().reset_latest = Some(value.clone());
    }

    fn on_initial(self: &Arc<Self>, value: &Value) {
        let mut effects = Effects::default();
        {
            let mut core = self.core.lock().unwrap();
            if core.latched {
                return;
            }
            core.latched = true;
            core.initial = value.clone();
            core.state = value.clone();
            effects.emit = Some(self.snapshot(&core, false, false));
        }
        run_effects(self, effects);
    }
}

/// The named handlers of a form: every configured input plus the reserved
/// `validate` and `reset` operations.
#[derive(Clone)]
pub struct FormHandlers {
    inputs: Handlers,
    shared: Arc<FormShared>,
}

impl FormHandlers {
    /// Call a field handler by name. Returns `false` when no such handler
    /// exists.
    pub fn call(&self, name: &str, value: impl Into<Value>) -> bool {
        self.inputs.call(name, value)
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.inputs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inputs.names()
    }

    /// Re-validate every field against current state. The future resolves
    /// with the snapshot of the `is_validated` emission; calling again while
    /// a pass is in flight returns the same future.
    pub fn validate(&self) -> SnapshotFuture {
        self.shared.start_validate()
    }

    /// Restore the construction-time initial state, clear all errors, and
    /// return `is_valid` to `None`. Resolves with the `is_resetted` snapshot.
    pub fn reset(&self) -> SnapshotFuture {
        self.shared.start_reset()
    }
}

/// A form: a reducer store whose fields carry validators, exposed as one
/// property of atomic `{state, errors, status}` snapshots.
///
/// Racing validations resolve last-writer-wins per field: a slow result for
/// an input the user has since replaced is discarded and never touches state
/// or errors.
///
/// # Examples
///
/// ```
/// use formwork::{Field, Form, Validation};
/// use serde_json::{json, Value};
///
/// let form = Form::new(
///     vec![Field::validated("set_age", "age", |value: &Value, _: &Value| {
///         if value.as_i64().map_or(false, |n| n >= 0) {
///             Validation::valid()
///         } else {
///             Validation::invalid("age must be non-negative")
///         }
///     })],
///     json!({ "age": 0 }),
/// )
/// .unwrap();
///
/// let output = form.stream();
/// let _watch = output.subscribe(|_| {});
///
/// form.handlers().call("set_age", json!(33));
/// let snapshot = output.get();
/// assert_eq!(snapshot.state, json!({ "age": 33 }));
/// assert_eq!(snapshot.status.is_valid, Some(true));
/// ```
pub struct Form {
    shared: Arc<FormShared>,
    handlers: FormHandlers,
    _subs: Vec<Subscription>,
    _retained_values: Vec<Observable<Value>>,
    _retained_errors: Vec<Observable<ErrorMap>>,
}

impl Form {
    /// Build a form with default options.
    pub fn new(fields: Vec<Field>, initial: impl Into<StateSource>) -> Result<Self, ConfigError> {
        Self::with_options(fields, initial, FormOptions::default())
    }

    /// Build a form with explicit [`FormOptions`].
    pub fn with_options(
        fields: Vec<Field>,
        initial: impl Into<StateSource>,
        options: FormOptions,
    ) -> Result<Self, ConfigError> {
        let adapter = options.adapter.unwrap_or_else(default_adapter);
        let (initial_value, initial_stream) = match initial.into() {
            StateSource::Value(Value::Null) => (adapter.empty(), None),
            StateSource::Value(value) => (value, None),
            StateSource::Stream(stream) => (adapter.empty(), Some(stream)),
        };

        let mut compiled = Vec::new();
        let mut input_streams = Vec::new();
        let mut reducer_outputs = Vec::new();
        let mut inputs = Handlers::new();
        let mut seen = HashSet::new();

        for field in fields {
            let validator_options = field.resolve_options(&adapter)?;
            let Field {
                input,
                reducer,
                validator,
            } = field;
            let resolved = resolve_input(input, RESERVED, &mut seen)?;
            if let Some((name, handler)) = resolved.handler {
                inputs.insert(name, handler);
            }
            let reducer = match compile_reducer(reducer, &adapter)? {
                CompiledReducer::Sync(reduce) => FieldReducer::Sync(reduce),
                CompiledReducer::Stream(stream_reducer) => {
                    reducer_outputs.push(stream_reducer.output);
                    FieldReducer::Stream(stream_reducer.pairs)
                }
            };
            let validator = match (validator, validator_options) {
                (Some((run, _)), Some(opts)) => Some(CompiledValidator {
                    run,
                    get: opts.get,
                    set: opts.set,
                    key: opts.key,
                }),
                _ => None,
            };
            compiled.push(CompiledField::new(reducer, validator));
            input_streams.push(resolved.stream);
        }

        let field_count = compiled.len();
        let shared = Arc::new(FormShared {
            core: Mutex::new(FormCore {
                state: initial_value.clone(),
                errors: ErrorMap::new(),
                interacted: false,
                initial: initial_value.clone(),
                latched: initial_stream.is_none(),
                fields: compiled,
                passes: Vec::new(),
                next_serial: 0,
                pending_validate: None,
                reset_latest: None,
            }),
            output: Property::new(FormSnapshot::initial(initial_value)),
            adapter,
            map_errors: options.map_errors,
            reset_combine: options
                .reset_with
                .as_ref()
                .map(|reset_with| Arc::clone(&reset_with.combine)),
        });

        let mut subs = Vec::new();
        let mut retained_values = Vec::new();
        let mut retained_errors = Vec::new();

        for (idx, stream) in input_streams.into_iter().enumerate() {
            let weak = Arc::downgrade(&shared);
            subs.push(stream.subscribe(move |value| {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_input(idx, value);
                }
            }));
            retained_values.push(stream);
        }

        for output in reducer_outputs {
            let weak = Arc::downgrade(&shared);
            subs.push(output.subscribe(move |next| {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_reduced_state(next);
                }
            }));
            retained_values.push(output);
        }

        if let Some(stream) = initial_stream {
            let weak = Arc::downgrade(&shared);
            subs.push(stream.subscribe(move |value| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_initial(value);
                }
            }));
            retained_values.push(stream);
        }

        if let Some(external) = options.external_errors {
            let weak = Arc::downgrade(&shared);
            let combine = external.combine;
            subs.push(external.stream.subscribe(move |errors| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_external(&combine, errors);
                }
            }));
            retained_errors.push(external.stream);
        }

        if let Some(reset_with) = options.reset_with {
            let weak = Arc::downgrade(&shared);
            subs.push(reset_with.stream.subscribe(move |value| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_reset_latest(value);
                }
            }));
            retained_values.push(reset_with.stream);
        }

        debug!(fields = field_count, "form built");

        let handlers = FormHandlers {
            inputs,
            shared: Arc::clone(&shared),
        };
        Ok(Self {
            shared,
            handlers,
            _subs: subs,
            _retained_values: retained_values,
            _retained_errors: retained_errors,
        })
    }

    /// The snapshot property. Holds the latest emission; subscribing
    /// delivers it immediately, then every change.
    pub fn stream(&self) -> Property<FormSnapshot> {
        self.shared.output.clone()
    }

    /// Alias for [`Form::stream`], for call sites that treat forms and
    /// snapshot streams interchangeably.
    pub fn to_stream(&self) -> Property<FormSnapshot> {
        self.stream()
    }

    /// Gate an event stream on whole-form validation: every event (a submit
    /// click, typically) triggers `validate()`, and the returned stream
    /// emits the resulting `is_validated` snapshot. Validations not caused
    /// by an event do not come through.
    pub fn validated_on(&self, events: &Observable<Value>) -> Observable<FormSnapshot> {
        let armed = Arc::new(AtomicBool::new(false));

        let weak = Arc::downgrade(&self.shared);
        let arm = Arc::clone(&armed);
        let trigger = events.subscribe(move |_| {
            arm.store(true, Ordering::SeqCst);
            if let Some(shared) = weak.upgrade() {
                let _ = shared.start_validate();
            }
        });

        let disarm = armed;
        let out = self.shared.output.changes().filter(move |snapshot| {
            snapshot.status.is_validated && disarm.swap(false, Ordering::SeqCst)
        });
        out.retain_upstream(trigger);
        out
    }

    /// Like [`Form::validated_on`], narrowed to passing validations and
    /// mapped to the validated state.
    pub fn valid_on(&self, events: &Observable<Value>) -> Observable<Value> {
        self.validated_on(events)
            .filter(|snapshot| snapshot.status.is_valid == Some(true))
            .map(|snapshot| snapshot.state.clone())
    }

    pub fn handlers(&self) -> &FormHandlers {
        &self.handlers
    }
}
