pub mod access_control;
pub mod accreditation;
pub mod configuration;
pub mod error_handling;
pub mod history;
pub mod storage;
pub mod transitions;
pub mod web_interface;
pub mod zone_time;
