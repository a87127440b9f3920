//! Two forms merged into one composite with atomic combined validate/reset.
//!
//! Run with: cargo run --example combined_forms

use formwork::{combine, Field, Form, Member, Validation};
use futures::executor::block_on;
use serde_json::{json, Value};

fn non_empty(value: &Value, _state: &Value) -> Validation {
    if value.as_str().map_or(false, |s| !s.is_empty()) {
        Validation::valid()
    } else {
        Validation::invalid("required")
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let shipping = Form::new(
        vec![
            Field::validated("set_street", "street", non_empty),
            Field::validated("set_city", "city", non_empty),
        ],
        json!({ "street": "", "city": "" }),
    )?;
    let billing = Form::new(
        vec![Field::validated("set_card", "card", non_empty)],
        json!({ "card": "" }),
    )?;

    let checkout = combine(vec![
        ("shipping", Member::from(shipping)),
        ("billing", Member::from(billing)),
    ])?;

    let _watch = checkout.stream().subscribe(|snapshot| {
        println!(
            "valid={:?} validated={} states={:?}",
            snapshot.status.is_valid, snapshot.status.is_validated, snapshot.states
        );
    });

    checkout
        .handlers("shipping")
        .expect("shipping member")
        .call("set_street", json!("12 Baker St"));
    checkout
        .handlers("billing")
        .expect("billing member")
        .call("set_card", json!("4242"));

    // One atomic combined emission once every member has answered.
    let snapshot = block_on(checkout.validate())?;
    println!(
        "combined validate: valid={:?} (city is still empty)",
        snapshot.status.is_valid
    );

    let snapshot = block_on(checkout.reset())?;
    println!("combined reset: states={:?}", snapshot.states);
    Ok(())
}
