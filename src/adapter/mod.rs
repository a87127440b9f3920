//! Pluggable state representation.
//!
//! The store engine treats state as an opaque [`Value`]; everything it needs
//! to know about the representation — how to build an empty state, read and
//! write a named field, and compare two states — goes through a
//! [`StateAdapter`]. The default [`ObjectAdapter`] works over plain JSON
//! objects.

mod adapter;

pub use adapter::{ObjectAdapter, StateAdapter};

pub(crate) use adapter::default_adapter;
