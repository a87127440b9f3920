//! Merging several forms (and plain value streams) into one composite whose
//! emissions stay atomic across members, including during combined
//! `validate` and `reset` passes.

mod combine;

pub use combine::{
    combine, Combined, CombinedFuture, CombinedSnapshot, CombineError, IntoFormStream, Member,
};
