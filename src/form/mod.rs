//! The form orchestrator: validated fields over a reducer store, emitting
//! atomic `{state, errors, status}` snapshots.
//!
//! Four update sources feed one output property: per-field updates, the
//! whole-form `validate` pass, external error streams, and `reset`. Every
//! emission is internally consistent, and racing asynchronous validations
//! resolve last-writer-wins per field.

mod config;
mod field;
mod form;
mod status;
mod validator;

pub use config::{ExternalErrors, Field, FormOptions, ResetWith, ValidatorOptions};
pub use form::{Form, FormHandlers, SnapshotFuture};
pub use status::{ErrorMap, FormSnapshot, Status};
pub use validator::Validation;
