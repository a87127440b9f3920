//! Push-based observable primitives: hot streams, properties, subjects and
//! promises. This is the substrate every higher layer sits on.

mod observable;
mod promise;
mod subject;

pub use observable::{Observable, Property, Subscription};
pub use promise::{Promise, Resolver};
pub use subject::Subject;
