//! Per-zone dwell-time computation over the movement log.

pub mod calculator;

pub use calculator::time_by_zone;
