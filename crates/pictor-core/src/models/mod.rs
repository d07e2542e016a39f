//! Data models shared by the store, the API and the worker

mod artifact;
mod transformation;

pub use artifact::*;
pub use transformation::*;
