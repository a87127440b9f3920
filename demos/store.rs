//! The bare store engine: reducers over a shared state, no validation.
//!
//! Run with: cargo run --example store

use formwork::{Input, Reducer, Row, Store, Subject};
use serde_json::{json, Value};

fn main() -> Result<(), formwork::ConfigError> {
    let ticks: Subject<Value> = Subject::new();

    let store = Store::new(
        vec![
            // String shorthands: handler "set_name" writes property "name".
            Row::new("set_name", "name"),
            // A custom reducer folding increments into a counter.
            Row::new(
                "add",
                Reducer::sync(|state, value| {
                    let total = state["total"].as_i64().unwrap_or(0) + value.as_i64().unwrap_or(0);
                    let mut next = state.clone();
                    next["total"] = json!(total);
                    next
                }),
            ),
            // An external event stream, no handler.
            Row::new(Input::stream(ticks.observable()), "last_tick"),
        ],
        json!({ "name": "", "total": 0, "last_tick": null }),
    )?;

    let _watch = store.stream().subscribe(|state| println!("state={state}"));

    store.handlers().call("set_name", json!("ada"));
    store.handlers().call("add", json!(2));
    store.handlers().call("add", json!(3));
    ticks.emit(json!(1700000000));

    println!("final={}", store.stream().get());
    Ok(())
}
