//! Configuration loading for streamdock.
//!
//! Values come from a TOML file (`streamdock.toml` or
//! `config/streamdock.toml` unless a path is given), an optional `.env` file
//! and `STREAMDOCK_*` environment variables, in increasing order of
//! precedence. The result is a
//! [`Config`] that hands out ready-made core types, plus a list of
//! [`ConfigWarnings`] for settings that look wrong but are not fatal.

pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{
    ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError,
};
pub use models::{
    Config, ConfigMetadata, FunctionConfig, LambdaConfig, StartConfig,
    StreamEventConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
