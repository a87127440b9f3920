//! Reactive form state management with per-field async validation.
//!
//! A form is a list of fields, each an `(input, reducer)` pair with an
//! optional validator. The form folds field events over one shared state and
//! emits atomic `{state, errors, status}` snapshots; validators can answer
//! synchronously or through a promise, and a slow verdict for an input the
//! user has since replaced is discarded rather than applied out of order.
//!
//! - [`store`] — the underlying reducer store with named handlers.
//! - [`form`] — validated fields, whole-form `validate`, `reset`, external
//!   errors.
//! - [`combine`] — several forms merged into one composite stream.
//! - [`observable`] — the push-based stream substrate the rest builds on.
//! - [`adapter`] — pluggable state representation.
//!
//! # Examples
//!
//! ```
//! use formwork::{Field, Form, Validation};
//! use serde_json::{json, Value};
//!
//! let form = Form::new(
//!     vec![Field::validated("set_name", "name", |value: &Value, _: &Value| {
//!         if value.as_str().map_or(false, |s| !s.is_empty()) {
//!             Validation::valid()
//!         } else {
//!             Validation::invalid("required")
//!         }
//!     })],
//!     json!({ "name": "" }),
//! )
//! .unwrap();
//!
//! let output = form.stream();
//! let _watch = output.subscribe(|snapshot| {
//!     println!("{:?}", snapshot.status);
//! });
//!
//! form.handlers().call("set_name", json!("ada"));
//! assert_eq!(output.get().state, json!({ "name": "ada" }));
//! ```

pub mod adapter;
pub mod combine;
pub mod form;
pub mod observable;
pub mod store;

pub use adapter::{ObjectAdapter, StateAdapter};
pub use combine::{
    combine, Combined, CombinedFuture, CombinedSnapshot, CombineError, IntoFormStream, Member,
};
pub use form::{
    ErrorMap, ExternalErrors, Field, Form, FormHandlers, FormOptions, FormSnapshot, ResetWith,
    SnapshotFuture, Status, Validation, ValidatorOptions,
};
pub use observable::{Observable, Promise, Property, Resolver, Subject, Subscription};
pub use store::{
    list_reducer, ConfigError, Handler, Handlers, Input, Reducer, Row, StateSource, Store,
};
