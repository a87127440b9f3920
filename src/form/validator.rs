use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use crate::observable::Promise;

/// A validator's verdict for one value.
///
/// `Value::Null` is valid; any other value is the error published under the
/// field's key. Asynchronous validators hand back a pending [`Promise`] and
/// settle it whenever they finish.
pub enum Validation {
    Ready(Value),
    Pending(Promise<Value>),
}

impl Validation {
    pub fn valid() -> Self {
        Validation::Ready(Value::Null)
    }

    pub fn invalid(error: impl Into<Value>) -> Self {
        Validation::Ready(error.into())
    }

    pub fn pending(promise: Promise<Value>) -> Self {
        Validation::Pending(promise)
    }
}

impl From<Value> for Validation {
    fn from(value: Value) -> Self {
        Validation::Ready(value)
    }
}

impl From<Promise<Value>> for Validation {
    fn from(promise: Promise<Value>) -> Self {
        Validation::Pending(promise)
    }
}

pub(crate) type ValidatorFn = Arc<dyn Fn(&Value, &Value) -> Validation + Send + Sync>;
pub(crate) type GetFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub(crate) type SetFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

/// Run a validator, containing panics: the payload becomes the error value,
/// exactly like a rejection.
pub(crate) fn run_validator(validator: &ValidatorFn, value: &Value, state: &Value) -> Validation {
    match catch_unwind(AssertUnwindSafe(|| validator(value, state))) {
        Ok(validation) => validation,
        Err(payload) => Validation::Ready(Value::String(panic_message(payload))),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "validator panicked".to_string()
    }
}
