//! Audit history services
//!
//! The `accreditation_history` table is append-only; these components read
//! and maintain it without ever rewriting a live row.
//!
//! Components:
//! - `changes`: the polling change feed over recent history rows.
//! - `archiver`: batched relocation of old rows into the archive table.

pub mod archiver;
pub mod changes;
