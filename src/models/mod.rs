//! Staging state model
//!
//! Plain value types; stores and use cases operate on them.

pub mod entry;
pub mod service;
pub mod state;

pub use entry::{DeleteOptions, Entry, TagEntry};
pub use service::{Operation, Service};
pub use state::{Scope, State};
