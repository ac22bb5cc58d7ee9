//! Configuration system for the Nebula sky tooling.
//!
//! Settings persist to disk as RON files. CLI overrides are applied via clap,
//! and every section tolerates missing or unknown fields so older and newer
//! config files keep loading.

mod cli;
mod config;
mod error;

pub use cli::{CliArgs, LuminanceArg};
pub use config::{AtmosphereConfig, Config, DebugConfig, ScalarValue, TableResolution};
pub use error::ConfigError;
