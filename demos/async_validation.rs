//! Asynchronous validation racing against new input.
//!
//! The "username" validator answers from a worker thread after a delay.
//! Typing again before the verdict lands makes the old verdict stale, and
//! stale verdicts never touch the form.
//!
//! Run with: cargo run --example async_validation

use std::thread;
use std::time::Duration;

use formwork::{Field, Form, Promise, Validation};
use serde_json::{json, Value};

fn check_username(value: &Value, _state: &Value) -> Validation {
    let (promise, resolver) = Promise::new();
    let candidate = value.as_str().unwrap_or("").to_string();
    thread::spawn(move || {
        // Stand-in for a backend round trip.
        thread::sleep(Duration::from_millis(50));
        if candidate == "admin" {
            resolver.resolve(json!("username is taken"));
        } else {
            resolver.resolve(Value::Null);
        }
    });
    Validation::pending(promise)
}

fn main() -> Result<(), formwork::ConfigError> {
    let form = Form::new(
        vec![Field::validated("set_username", "username", check_username)],
        json!({ "username": "" }),
    )?;

    let _watch = form.stream().subscribe(|snapshot| {
        println!(
            "state={} errors={}",
            snapshot.state,
            Value::Object(snapshot.errors.clone())
        );
    });

    // Two quick keystrokes: the verdict for "admin" resolves after the form
    // has already moved on to "ada", so it is discarded.
    form.handlers().call("set_username", json!("admin"));
    form.handlers().call("set_username", json!("ada"));

    thread::sleep(Duration::from_millis(200));
    let snapshot = form.stream().get();
    println!(
        "final: state={} errors={}",
        snapshot.state,
        Value::Object(snapshot.errors.clone())
    );
    Ok(())
}
