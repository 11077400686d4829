//! API access control.
//!
//! Mutating routes are gated on per-user feature permissions looked up by
//! the `X-Api-Token` header. Read routes stay open.

pub mod gate;

pub use gate::{with_permission, AccessDenied, AuthedUser};
