//! Environment-based configuration.
//!
//! Recognizes exactly one variable for the storage path,
//! `CURVETREE_DATA_DIR`, overriding the path passed to
//! [`crate::storage::open`]. `CURVETREE_LOG_LEVEL` is a companion,
//! read the same way, to drive [`crate::logging::init_from_config`].

use std::env;
use std::path::PathBuf;
use thiserror::Error;

use crate::storage::StorageKind;

/// Default storage directory when `CURVETREE_DATA_DIR` is unset.
pub const DEFAULT_DATA_DIR: &str = "./curvetree-data";

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Top-level configuration for the CLI and any embedding host.
#[derive(Debug, Clone)]
pub struct CurveTreeConfig {
    /// Directory the durable storage backend opens. Ignored when
    /// `storage_kind` is `Memory`.
    pub data_dir: PathBuf,

    /// Which `Storage` backend to construct.
    pub storage_kind: StorageKind,

    /// Minimum log level to emit.
    pub log_level: String,

    /// Tree shape. Fixed per chain, not environment-tunable, so this
    /// uses `TreeConfig::default()` rather than reading it from the
    /// environment.
    pub tree: crate::tree::TreeConfig,
}

impl CurveTreeConfig {
    /// Loads configuration from the environment. Never fails on a
    /// missing `CURVETREE_DATA_DIR` — it falls back to
    /// [`DEFAULT_DATA_DIR`], since overriding the storage path is an
    /// optional override, not a requirement.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = env::var("CURVETREE_DATA_DIR")
            .unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string())
            .into();

        let log_level = env::var("CURVETREE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            data_dir,
            storage_kind: StorageKind::Sled,
            log_level,
            tree: crate::tree::TreeConfig::default(),
        })
    }
}
