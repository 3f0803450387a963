//! Project configuration for the command-line front end.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::policy::{
    CompileContext, Policy, SecurityPredicateSpec, DEFAULT_BOUND_PARAMETER_KEY,
    DEFAULT_POLICY_VERSION,
};

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "project.config.json";

/// Optional defaults for `compile --query`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Policy used for ad-hoc queries.
    #[serde(default)]
    pub policy: Option<Policy>,
    /// Context used for ad-hoc queries.
    #[serde(default)]
    pub context: Option<CompileContext>,
}

/// A loaded config and where it came from.
#[derive(Clone, Debug, Default)]
pub struct LoadedConfig {
    /// Resolved path, whether or not it existed.
    pub path: Option<PathBuf>,
    /// Whether the file existed.
    pub exists: bool,
    /// Parsed contents, empty when the file is absent.
    pub config: ProjectConfig,
}

/// Errors raised while loading the project config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file does not exist: {path}")]
    Missing { path: PathBuf },
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid JSON in config file {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid TOML in config file {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ProjectConfig {
    /// Loads `explicit`, or `project.config.json` under `cwd`.
    ///
    /// An explicit path must exist; the default file is optional.
    pub fn load(explicit: Option<PathBuf>, cwd: &Path) -> Result<LoadedConfig, ConfigError> {
        let required = explicit.is_some();
        let path = explicit.unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_FILE));
        if !path.exists() {
            if required {
                return Err(ConfigError::Missing { path });
            }
            return Ok(LoadedConfig {
                path: Some(path),
                exists: false,
                config: ProjectConfig::default(),
            });
        }
        let config = read_file(&path)?;
        Ok(LoadedConfig {
            path: Some(path),
            exists: true,
            config,
        })
    }

    /// Policy for ad-hoc queries: the configured one, else an empty `v0` policy.
    pub fn policy_or_default(&self) -> Policy {
        self.policy.clone().unwrap_or_else(|| Policy {
            version: Some(DEFAULT_POLICY_VERSION.to_owned()),
            ..Policy::default()
        })
    }

    /// Context for ad-hoc queries: the configured one, else a tenant context
    /// constrained on `tenant_id`.
    pub fn context_or_default(&self) -> CompileContext {
        self.context.clone().unwrap_or_else(|| CompileContext {
            tenant_context_present: true,
            security_predicate: Some(SecurityPredicateSpec {
                field: Some("tenant_id".to_owned()),
                operator: Some("==".to_owned()),
                bound_parameter_key: Some(DEFAULT_BOUND_PARAMETER_KEY.to_owned()),
            }),
            auth_context_hash: None,
        })
    }
}

fn read_file(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    } else {
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}
