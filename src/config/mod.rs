//! Configuration module for tabula.
//!
//! Handles compiler defaults, connection settings and environment variables.

mod settings;

pub use settings::{
    expand_env_vars, parse_duration, CompileSettings, ConnectionSettings, Driver, Settings,
    SettingsError,
};
