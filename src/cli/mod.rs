#![forbid(unsafe_code)]

//! Command-line front end.
//!
//! The binary in `src/bin/cli.rs` only parses arguments; everything it runs
//! lives here so it can be exercised without spawning a process.

use thiserror::Error;

/// `compile`, `validate-plan` and `sql` commands.
pub mod commands;

/// Project config discovery and loading.
pub mod config;

pub use commands::{run_compile, run_sql, run_validate_plan, CompileOptions, SqlOptions};
pub use config::{ConfigError, LoadedConfig, ProjectConfig, DEFAULT_CONFIG_FILE};

/// Errors that can occur in CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid combination of command-line options.
    #[error("{0}")]
    Usage(&'static str),
    /// Unreadable input file.
    #[error("{0}")]
    Message(String),
    /// IO error from file operations.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Output serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Project config could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A plan failed structural validation.
    #[error(transparent)]
    Compile(#[from] crate::error::CompileError),
    /// The adapter rejected a plan or mapping.
    #[error(transparent)]
    Adapter(#[from] crate::adapter::AdapterError),
}
