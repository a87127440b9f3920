use serde_json::Value;

use crate::observable::Subject;
use crate::store::SyncReducerFn;

use super::validator::{GetFn, SetFn, ValidatorFn};

pub(crate) enum FieldReducer {
    Sync(SyncReducerFn),
    // The feed side of a stream reducer; its output is subscribed separately.
    Stream(Subject<(Value, Value)>),
}

pub(crate) struct CompiledValidator {
    pub(crate) run: ValidatorFn,
    pub(crate) get: GetFn,
    pub(crate) set: SetFn,
    pub(crate) key: String,
}

/// Per-field runtime slot. The two counters implement last-writer-wins for
/// racing validations: `next_seq` numbers inputs as they arrive,
/// `latest_input` is the sequence a result must match to be accepted.
pub(crate) struct CompiledField {
    pub(crate) reducer: FieldReducer,
    pub(crate) validator: Option<CompiledValidator>,
    pub(crate) next_seq: u64,
    pub(crate) latest_input: u64,
}

impl CompiledField {
    pub(crate) fn new(reducer: FieldReducer, validator: Option<CompiledValidator>) -> Self {
        Self {
            reducer,
            validator,
            next_seq: 0,
            latest_input: 0,
        }
    }

    /// Number a new input and mark it latest.
    pub(crate) fn issue_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.latest_input = self.next_seq;
        self.next_seq
    }

    /// Invalidate every in-flight validation for this field.
    pub(crate) fn bump(&mut self) {
        self.next_seq += 1;
        self.latest_input = self.next_seq;
    }
}
