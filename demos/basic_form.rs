//! A login form with two validated fields, driven from plain function calls.
//!
//! Run with: cargo run --example basic_form

use formwork::{Field, Form, Validation};
use futures::executor::block_on;
use serde_json::{json, Value};

fn main() -> Result<(), formwork::ConfigError> {
    let form = Form::new(
        vec![
            Field::validated("set_email", "email", |value: &Value, _: &Value| {
                if value.as_str().map_or(false, |s| s.contains('@')) {
                    Validation::valid()
                } else {
                    Validation::invalid("not an email address")
                }
            }),
            Field::validated("set_password", "password", |value: &Value, _: &Value| {
                if value.as_str().map_or(false, |s| s.len() >= 8) {
                    Validation::valid()
                } else {
                    Validation::invalid("at least 8 characters")
                }
            }),
        ],
        json!({ "email": "", "password": "" }),
    )?;

    let _watch = form.stream().subscribe(|snapshot| {
        println!(
            "state={} errors={} valid={:?}",
            snapshot.state,
            Value::Object(snapshot.errors.clone()),
            snapshot.status.is_valid
        );
    });

    form.handlers().call("set_email", json!("ada"));
    form.handlers().call("set_email", json!("ada@example.com"));
    form.handlers().call("set_password", json!("hunter2"));

    // Whole-form validation re-checks every field against current state.
    let snapshot = block_on(form.handlers().validate()).expect("validate settles");
    println!("after validate: valid={:?}", snapshot.status.is_valid);

    let snapshot = block_on(form.handlers().reset()).expect("reset settles");
    println!("after reset: state={}", snapshot.state);
    Ok(())
}
