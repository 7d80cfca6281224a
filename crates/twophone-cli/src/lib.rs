//! twophone CLI library
//!
//! Configuration loading, the JSON-file device store and the command handlers
//! behind the `twophone` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod store;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::AppConfig;
pub use error::{CliError, Result};
pub use store::JsonFileDeviceStore;
