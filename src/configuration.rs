//! Runtime configuration loading (TOML file + validation).

pub mod config;

pub use config::Config;
