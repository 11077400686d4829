//! Storage subsystem
//!
//! This module provides the persistence layer for accreditations, their
//! vehicles, the zone movement log, time slots, audit history and the
//! access-control tables.
//!
//! Components:
//! - `store_trait`: the Store trait defining a uniform operation API.
//! - `types`: shared payload/result types and timestamp helpers.
//! - `database_store`: ORM-based SQLite implementation using SeaORM.
//! - `db_entities`: SeaORM entity models for the database backend.

pub mod database_store;
pub mod db_entities;
pub mod store_trait;
pub mod types;

pub use database_store::DatabaseStore;
pub use store_trait::Store;
