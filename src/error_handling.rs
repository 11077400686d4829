//! Error types shared across the crate.
//!
//! Each concern keeps its own enum; HTTP status mapping happens only at the
//! web boundary.

pub mod types;

pub use types::*;
