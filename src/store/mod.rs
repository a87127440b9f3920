//! The store engine: merge any number of `(input, reducer)` pairs against a
//! shared state stream, producing one state property with named handlers.

mod config;
mod handlers;
mod list;
mod store;

pub use config::{
    ConfigError, Input, Reducer, Row, StateSource, StreamReducerFn, SyncReducerFn,
};
pub use handlers::{Handler, Handlers};
pub use list::list_reducer;
pub use store::Store;

pub(crate) use config::{compile_reducer, resolve_input, CompiledReducer};
