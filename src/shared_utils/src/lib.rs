//! Small helpers shared by the dashboard crates: environment access and the
//! TOML configuration document.

pub mod config;
pub mod env;
