use std::sync::{Arc, Mutex};

use futures::executor::block_on;
use proptest::prelude::*;
use serde_json::{json, Value};

use formwork::{
    combine, list_reducer, ConfigError, ExternalErrors, Field, Form, FormOptions, FormSnapshot,
    Input, Member, Promise, Reducer, ResetWith, Resolver, Row, StateSource, Store, Subject,
    Validation,
};

fn positive(value: &Value, _state: &Value) -> Validation {
    if value.as_i64().unwrap_or(0) > 0 {
        Validation::valid()
    } else {
        Validation::invalid("ERROR")
    }
}

/// A form whose validator defers every verdict, capturing the resolver and
/// the raw value it was asked about.
fn deferred_form(field: &str, key: &str) -> (Form, Arc<Mutex<Vec<(Value, Resolver<Value>)>>>) {
    let captured: Arc<Mutex<Vec<(Value, Resolver<Value>)>>> = Arc::new(Mutex::new(Vec::new()));
    let slots = Arc::clone(&captured);
    let form = Form::new(
        vec![Field::validated(field, key, move |value: &Value, _: &Value| {
            let (promise, resolver) = Promise::new();
            slots.lock().unwrap().push((value.clone(), resolver));
            Validation::pending(promise)
        })],
        json!({ key: Value::Null }),
    )
    .unwrap();
    (form, captured)
}

#[test]
fn concrete_set_value_scenario() {
    let form = Form::new(
        vec![Field::validated("setValue", "value", positive)],
        json!({ "value": 0 }),
    )
    .unwrap();
    let output = form.stream();
    let _watch = output.subscribe(|_| {});

    form.handlers().call("setValue", json!(-1));
    let snapshot = output.get();
    assert_eq!(snapshot.state, json!({ "value": -1 }));
    assert_eq!(snapshot.errors.get("value"), Some(&json!("ERROR")));
    assert_eq!(snapshot.status.is_valid, Some(false));
    assert!(!snapshot.status.is_validated);
    assert!(!snapshot.status.is_resetted);

    form.handlers().call("setValue", json!(5));
    let snapshot = output.get();
    assert_eq!(snapshot.state, json!({ "value": 5 }));
    assert_eq!(snapshot.errors.get("value"), Some(&Value::Null));
    assert_eq!(snapshot.status.is_valid, Some(true));
}

#[test]
fn stale_validation_result_never_lands() {
    let (form, captured) = deferred_form("setValue", "value");
    let output = form.stream();
    let _watch = output.subscribe(|_| {});

    form.handlers().call("setValue", json!("a"));
    form.handlers().call("setValue", json!("b"));

    let (first, second) = {
        let mut slots = captured.lock().unwrap();
        let second = slots.pop().unwrap();
        let first = slots.pop().unwrap();
        (first, second)
    };

    second.1.resolve(Value::Null);
    assert_eq!(output.get().state, json!({ "value": "b" }));

    first.1.resolve(json!("late failure"));
    let snapshot = output.get();
    assert_eq!(snapshot.state, json!({ "value": "b" }));
    assert_eq!(snapshot.errors.get("value"), Some(&Value::Null));
}

#[test]
fn invalid_input_still_updates_state() {
    let form = Form::new(
        vec![Field::validated("setValue", "value", positive)],
        json!({ "value": 1 }),
    )
    .unwrap();
    let output = form.stream();
    let _watch = output.subscribe(|_| {});

    form.handlers().call("setValue", json!(-7));
    let snapshot = output.get();
    assert_eq!(snapshot.state, json!({ "value": -7 }));
    assert_eq!(snapshot.errors.get("value"), Some(&json!("ERROR")));
}

#[test]
fn every_emission_is_internally_consistent() {
    let form = Form::new(
        vec![Field::validated("setValue", "value", positive)],
        json!({ "value": 1 }),
    )
    .unwrap();
    let output = form.stream();

    let seen: Arc<Mutex<Vec<FormSnapshot>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _watch = output
        .changes()
        .subscribe(move |snapshot| sink.lock().unwrap().push(snapshot.clone()));

    for value in [3, -1, 8, 0, 12] {
        form.handlers().call("setValue", json!(value));
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 5);
    for snapshot in seen.iter() {
        let value = snapshot.state["value"].as_i64().unwrap();
        let expected = if value > 0 {
            Value::Null
        } else {
            json!("ERROR")
        };
        // Errors always describe the state of the same emission.
        assert_eq!(snapshot.errors.get("value"), Some(&expected));
        assert_eq!(snapshot.status.is_valid, Some(value > 0));
    }
}

#[test]
fn is_valid_stays_unset_until_interaction() {
    let form = Form::new(
        vec![Field::validated("setValue", "value", positive)],
        json!({ "value": 1 }),
    )
    .unwrap();
    let output = form.stream();
    let _watch = output.subscribe(|_| {});

    assert_eq!(output.get().status.is_valid, None);

    form.handlers().call("setValue", json!(2));
    assert_eq!(output.get().status.is_valid, Some(true));
}

#[test]
fn validate_call_makes_is_valid_concrete() {
    let form = Form::new(
        vec![Field::validated("setValue", "value", positive)],
        json!({ "value": 1 }),
    )
    .unwrap();

    assert_eq!(form.stream().get().status.is_valid, None);
    let snapshot = block_on(form.handlers().validate()).unwrap();
    assert_eq!(snapshot.status.is_valid, Some(true));
    assert!(snapshot.status.is_validated);
}

#[test]
fn reset_round_trips_to_construction_snapshot() {
    let form = Form::new(
        vec![Field::validated("setValue", "value", positive)],
        json!({ "value": 1 }),
    )
    .unwrap();
    let output = form.stream();
    let _watch = output.subscribe(|_| {});
    let initial = output.get();

    form.handlers().call("setValue", json!(-3));
    let snapshot = block_on(form.handlers().reset()).unwrap();

    assert_eq!(snapshot.state, initial.state);
    assert!(snapshot.errors.is_empty());
    assert_eq!(snapshot.status.is_valid, None);
    assert!(snapshot.status.is_resetted);

    // The very next update drops the one-shot flag again.
    form.handlers().call("setValue", json!(4));
    assert!(!output.get().status.is_resetted);
}

#[test]
fn validate_returns_shared_future_while_in_flight() {
    let (form, captured) = deferred_form("setValue", "value");

    let first = form.handlers().validate();
    let second = form.handlers().validate();
    assert!(first.ptr_eq(&second));
    assert_eq!(captured.lock().unwrap().len(), 1);

    let (_, resolver) = captured.lock().unwrap().pop().unwrap();
    resolver.resolve(Value::Null);

    let snapshot = block_on(first).unwrap();
    assert!(snapshot.status.is_validated);
}

#[test]
fn state_change_mid_flight_starts_a_fresh_validate() {
    let (form, captured) = deferred_form("setValue", "value");
    let output = form.stream();
    let _watch = output.subscribe(|_| {});

    let first = form.handlers().validate();

    // A field update whose verdict lands changes state, invalidating the
    // in-flight entry.
    form.handlers().call("setValue", json!("fresh"));
    let (_, resolver) = captured.lock().unwrap().pop().unwrap();
    resolver.resolve(Value::Null);

    let second = form.handlers().validate();
    assert!(!first.ptr_eq(&second));
}

#[test]
fn zero_validator_form_still_answers_validate() {
    let form = Form::new(vec![Field::plain("set_note", "note")], json!({})).unwrap();
    let snapshot = block_on(form.handlers().validate()).unwrap();
    assert!(snapshot.status.is_validated);
}

#[test]
fn whole_form_validation_rechecks_current_state() {
    let form = Form::new(
        vec![Field::validated("setValue", "value", positive)],
        json!({ "value": -2 }),
    )
    .unwrap();

    // Nothing ever flowed through the field; validate() reads the value out
    // of current state through the validator options.
    let snapshot = block_on(form.handlers().validate()).unwrap();
    assert_eq!(snapshot.errors.get("value"), Some(&json!("ERROR")));
    assert_eq!(snapshot.status.is_valid, Some(false));
}

#[test]
fn combined_validate_waits_for_every_member() {
    let f1 = Form::new(
        vec![Field::validated("setValue", "value", positive)],
        json!({ "value": 1 }),
    )
    .unwrap();
    let f2 = Form::new(
        vec![Field::validated("setValue", "value", positive)],
        json!({ "value": 2 }),
    )
    .unwrap();
    let (f3, captured) = deferred_form("setValue", "value");

    let combined = combine(vec![
        ("f1", Member::from(f1)),
        ("f2", Member::from(f2)),
        ("f3", Member::from(f3)),
    ])
    .unwrap();
    let output = combined.stream();
    let _watch = output.subscribe(|_| {});

    // A member's own validate must not flip the combined flag.
    let _ = block_on(combined.handlers("f1").unwrap().validate()).unwrap();
    assert!(!output.get().status.is_validated);

    let pending = combined.validate();
    // f1 and f2 answered synchronously; f3 is still out.
    assert!(!output.get().status.is_validated);

    let (_, resolver) = captured.lock().unwrap().pop().unwrap();
    resolver.resolve(Value::Null);

    let snapshot = block_on(pending).unwrap();
    assert!(snapshot.status.is_validated);
    assert_eq!(snapshot.states["f3"], json!({ "value": Value::Null }));
}

#[test]
fn combined_reset_restores_every_member() {
    let f1 = Form::new(
        vec![Field::validated("setValue", "value", positive)],
        json!({ "value": 1 }),
    )
    .unwrap();
    let f2 = Form::new(vec![Field::plain("set_note", "note")], json!({ "note": "" })).unwrap();

    let combined = combine(vec![("f1", Member::from(f1)), ("f2", Member::from(f2))]).unwrap();
    let output = combined.stream();
    let _watch = output.subscribe(|_| {});

    combined.handlers("f1").unwrap().call("setValue", json!(-5));
    combined
        .handlers("f2")
        .unwrap()
        .call("set_note", json!("scratch"));

    let snapshot = block_on(combined.reset()).unwrap();
    assert!(snapshot.status.is_resetted);
    assert_eq!(snapshot.states["f1"], json!({ "value": 1 }));
    assert_eq!(snapshot.states["f2"], json!({ "note": "" }));
    assert_eq!(snapshot.status.is_valid, None);
}

#[test]
fn plain_store_stream_participates_in_combine() {
    let store = Store::new(vec![Row::new("tick", "count")], json!({ "count": 0 })).unwrap();
    let form = Form::new(vec![Field::plain("set_note", "note")], json!({})).unwrap();

    let combined = combine(vec![
        ("form", Member::from(form)),
        ("counter", Member::from(store.stream().changes())),
    ])
    .unwrap();
    let output = combined.stream();
    let _watch = output.subscribe(|_| {});
    let _store_watch = store.stream().subscribe(|_| {});

    store.handlers().call("tick", json!(3));

    let snapshot = output.get();
    assert_eq!(snapshot.states["counter"], json!({ "count": 3 }));
    assert_eq!(snapshot.statuses["counter"].is_valid, Some(true));
}

#[test]
fn external_errors_merge_into_error_map() {
    let server_errors: Subject<formwork::ErrorMap> = Subject::new();
    let form = Form::with_options(
        vec![Field::validated("setValue", "value", positive)],
        json!({ "value": 1 }),
        FormOptions::new().external_errors(ExternalErrors::new(server_errors.observable())),
    )
    .unwrap();
    let output = form.stream();
    let _watch = output.subscribe(|_| {});

    let mut errors = formwork::ErrorMap::new();
    errors.insert("server".to_string(), json!("unavailable"));
    server_errors.emit(errors);

    let snapshot = output.get();
    assert_eq!(snapshot.errors.get("server"), Some(&json!("unavailable")));
    assert_eq!(snapshot.status.is_valid, Some(false));
    assert!(!snapshot.status.is_validated);
}

#[test]
fn map_errors_shapes_emitted_errors() {
    let form = Form::with_options(
        vec![Field::validated("setValue", "value", positive)],
        json!({ "value": 1 }),
        FormOptions::new().map_errors(|errors| {
            // Drop entries for fields that validated clean.
            errors
                .iter()
                .filter(|(_, error)| !error.is_null())
                .map(|(key, error)| (key.clone(), error.clone()))
                .collect()
        }),
    )
    .unwrap();
    let output = form.stream();
    let _watch = output.subscribe(|_| {});

    form.handlers().call("setValue", json!(9));
    let snapshot = output.get();
    assert!(snapshot.errors.is_empty());
    assert_eq!(snapshot.status.is_valid, Some(true));
}

#[test]
fn reset_with_uses_latest_external_value() {
    let drafts: Subject<Value> = Subject::new();
    let form = Form::with_options(
        vec![Field::plain("set_name", "name")],
        json!({ "name": "" }),
        FormOptions::new().reset_with(ResetWith::new(drafts.observable())),
    )
    .unwrap();
    let output = form.stream();
    let _watch = output.subscribe(|_| {});

    drafts.emit(json!({ "name": "draft" }));
    form.handlers().call("set_name", json!("typed"));

    let snapshot = block_on(form.handlers().reset()).unwrap();
    assert_eq!(snapshot.state, json!({ "name": "draft" }));
    assert!(snapshot.status.is_resetted);
}

#[test]
fn form_initial_state_latches_from_stream() {
    let seeds: Subject<Value> = Subject::new();
    let form = Form::new(
        vec![Field::plain("set_name", "name")],
        StateSource::Stream(seeds.observable()),
    )
    .unwrap();
    let output = form.stream();
    let _watch = output.subscribe(|_| {});

    seeds.emit(json!({ "name": "seed" }));
    assert_eq!(output.get().state, json!({ "name": "seed" }));

    form.handlers().call("set_name", json!("typed"));
    let snapshot = block_on(form.handlers().reset()).unwrap();
    assert_eq!(snapshot.state, json!({ "name": "seed" }));
}

#[test]
fn merged_and_composed_inputs_flow_through_validation() {
    let remote: Subject<Value> = Subject::new();
    let form = Form::new(
        vec![
            Field::validated(
                Input::named_merged("setValue", remote.observable()),
                "value",
                positive,
            ),
            Field::plain(
                Input::composed("set_label", |stream| {
                    stream.map(|value| json!(format!("#{}", value.as_str().unwrap_or(""))))
                }),
                "label",
            ),
        ],
        json!({ "value": 0, "label": "" }),
    )
    .unwrap();
    let output = form.stream();
    let _watch = output.subscribe(|_| {});

    // The handler and the external stream drive the same validated field.
    form.handlers().call("setValue", json!(4));
    let snapshot = output.get();
    assert_eq!(snapshot.state["value"], json!(4));
    assert_eq!(snapshot.errors.get("value"), Some(&Value::Null));

    remote.emit(json!(-2));
    let snapshot = output.get();
    assert_eq!(snapshot.state["value"], json!(-2));
    assert_eq!(snapshot.errors.get("value"), Some(&json!("ERROR")));

    // The composed hook rewrites handler values before the reducer sees them.
    form.handlers().call("set_label", json!("alpha"));
    assert_eq!(output.get().state["label"], json!("#alpha"));
}

#[test]
fn list_reducer_updates_matching_rows_in_a_store() {
    let store = Store::new(
        vec![Row::new("toggle", list_reducer("done").unwrap())],
        json!([
            { "id": 1, "done": false },
            { "id": 2, "done": false },
        ]),
    )
    .unwrap();
    let state = store.stream();
    let _watch = state.subscribe(|_| {});

    store
        .handlers()
        .call("toggle", json!({ "query": { "id": 2 }, "data": true }));

    assert_eq!(
        state.get(),
        json!([
            { "id": 1, "done": false },
            { "id": 2, "done": true },
        ])
    );
}

#[test]
fn submit_stream_gated_on_validation() {
    let form = Form::new(
        vec![Field::validated("setValue", "value", positive)],
        json!({ "value": 0 }),
    )
    .unwrap();
    let submits: Subject<Value> = Subject::new();
    let accepted = form.valid_on(&submits.observable());

    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _watch = accepted.subscribe(move |state| sink.lock().unwrap().push(state.clone()));

    // Submitting while invalid produces nothing.
    submits.emit(Value::Null);
    assert!(seen.lock().unwrap().is_empty());

    form.handlers().call("setValue", json!(9));
    submits.emit(Value::Null);
    assert_eq!(*seen.lock().unwrap(), vec![json!({ "value": 9 })]);
}

#[test]
fn duplicate_field_names_fail_construction() {
    let result = Form::new(
        vec![
            Field::plain("set_name", "name"),
            Field::plain("set_name", "other"),
        ],
        json!({}),
    );
    assert!(matches!(result, Err(ConfigError::DuplicateHandlerName(_))));
}

#[test]
fn validator_without_options_on_custom_reducer_fails() {
    let result = Form::new(
        vec![Field::validated(
            "set_name",
            Reducer::sync(|state, _| state.clone()),
            |_: &Value, _: &Value| Validation::valid(),
        )],
        json!({}),
    );
    assert!(matches!(
        result,
        Err(ConfigError::IncompleteValidationConfig(_))
    ));
}

proptest! {
    // Whatever order deferred verdicts resolve in, only the verdict for the
    // newest input may touch state and errors.
    #[test]
    fn last_input_wins_under_any_resolution_order(
        inputs in prop::collection::vec(-50i64..50, 1..8),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 8),
    ) {
        let (form, captured) = deferred_form("setValue", "value");
        let output = form.stream();
        let _watch = output.subscribe(|_| {});

        for value in &inputs {
            form.handlers().call("setValue", json!(value));
        }

        let mut slots = std::mem::take(&mut *captured.lock().unwrap());
        let mut turn = 0usize;
        while !slots.is_empty() {
            let at = picks[turn % picks.len()].index(slots.len());
            let (value, resolver) = slots.remove(at);
            if value.as_i64().unwrap() % 2 == 0 {
                resolver.resolve(Value::Null);
            } else {
                resolver.resolve(json!("odd"));
            }
            turn += 1;
        }

        let last = *inputs.last().unwrap();
        let snapshot = output.get();
        prop_assert_eq!(&snapshot.state, &json!({ "value": last }));
        let expected = if last % 2 == 0 { Value::Null } else { json!("odd") };
        prop_assert_eq!(snapshot.errors.get("value"), Some(&expected));
    }
}
