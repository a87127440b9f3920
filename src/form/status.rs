use serde_json::Value;

/// Field errors keyed by validation key. `Value::Null` means the field is
/// valid; anything else is the error value.
pub type ErrorMap = serde_json::Map<String, Value>;

/// The validity flags carried by every form emission.
///
/// `is_valid` stays `None` until the form has seen any interaction; after
/// that it is the conjunction of "every error entry is null". Reset returns
/// it to `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub is_valid: Option<bool>,
    pub is_validated: bool,
    pub is_resetted: bool,
}

impl Status {
    pub(crate) fn initial() -> Self {
        Self {
            is_valid: None,
            is_validated: false,
            is_resetted: false,
        }
    }
}

/// One atomic emission of a form: state, errors, and status always
/// correspond to the same logical event.
#[derive(Clone, Debug, PartialEq)]
pub struct FormSnapshot {
    pub state: Value,
    pub errors: ErrorMap,
    pub status: Status,
}

impl FormSnapshot {
    pub(crate) fn initial(state: Value) -> Self {
        Self {
            state,
            errors: ErrorMap::new(),
            status: Status::initial(),
        }
    }
}

pub(crate) fn all_null(errors: &ErrorMap) -> bool {
    errors.values().all(Value::is_null)
}
