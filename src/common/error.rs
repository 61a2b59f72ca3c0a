//! Crate-wide error composition.
//!
//! Every component owns its own `thiserror`-derived error enum
//! (`GroupError`, `OutputTupleError`, `StorageError`, `TreeError`,
//! `WalletError`, `ConfigError`); this module composes them into one
//! `CurveTreeError` at the crate boundary via `#[from]`, the same
//! pattern this codebase used for its prior `ZVaultError`.

use thiserror::Error;

use crate::config::ConfigError;
use crate::group::GroupError;
use crate::logging::LoggingError;
use crate::output::OutputTupleError;
use crate::storage::StorageError;
use crate::tree::TreeError;
use crate::wallet::WalletError;

/// Root error type for the curve tree subsystem.
#[derive(Debug, Error)]
pub enum CurveTreeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("group error: {0}")]
    Group(#[from] GroupError),

    #[error("output tuple error: {0}")]
    Output(#[from] OutputTupleError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CurveTreeError {
    /// Stable kind tag for the `error: <kind>: <message>` CLI format and
    /// for the structured `kind` field logged alongside every surfaced
    /// error.
    pub fn kind(&self) -> &'static str {
        match self {
            CurveTreeError::Config(_) => "config_error",
            CurveTreeError::Logging(_) => "logging_error",
            CurveTreeError::Group(_) => "group_error",
            CurveTreeError::Output(_) => "output_error",
            CurveTreeError::Storage(_) => "storage_error",
            CurveTreeError::Tree(err) => tree_error_kind(err),
            CurveTreeError::Wallet(_) => "wallet_error",
            CurveTreeError::Io(_) => "io_error",
        }
    }

    /// The process exit code this error maps onto, for CLI use.
    pub fn exit_code(&self) -> i32 {
        match self {
            CurveTreeError::Config(_) | CurveTreeError::Output(_) => 2,
            CurveTreeError::Storage(_) | CurveTreeError::Io(_) => 3,
            CurveTreeError::Tree(
                TreeError::IntegrityFailure(..)
                | TreeError::Fatal
                | TreeError::SchemaVersionMismatch(..)
                | TreeError::CorruptCheckpoint(_),
            ) => 4,
            CurveTreeError::Tree(_) | CurveTreeError::Wallet(_) | CurveTreeError::Group(_) | CurveTreeError::Logging(_) => 3,
        }
    }
}

fn tree_error_kind(err: &TreeError) -> &'static str {
    match err {
        TreeError::InvalidOutput(_) => "invalid_output",
        TreeError::TreeFull => "tree_full",
        TreeError::OutOfRange(..) => "out_of_range",
        TreeError::Storage(_) => "storage_error",
        TreeError::IntegrityFailure(..) => "integrity_failure",
        TreeError::Fatal => "fatal",
        TreeError::RebuildFailed(_) => "rebuild_failed",
        TreeError::SchemaVersionMismatch(..) => "schema_version_mismatch",
        TreeError::CorruptCheckpoint(_) => "corrupt_checkpoint",
        TreeError::MalformedBranch(..) => "malformed_branch",
    }
}

pub type Result<T> = std::result::Result<T, CurveTreeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_full_maps_to_storage_exit_code() {
        let err = CurveTreeError::Tree(TreeError::TreeFull);
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.kind(), "tree_full");
    }

    #[test]
    fn integrity_failure_maps_to_exit_code_four() {
        let err = CurveTreeError::Tree(TreeError::Fatal);
        assert_eq!(err.exit_code(), 4);
        assert_eq!(err.kind(), "fatal");
    }

    #[test]
    fn config_error_maps_to_exit_code_two() {
        let err = CurveTreeError::Config(ConfigError::MissingEnvVar("X".to_string()));
        assert_eq!(err.exit_code(), 2);
    }
}
