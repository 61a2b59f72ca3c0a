//! Errors surfaced by [`crate::tree::CurveTree`].

use thiserror::Error;

use crate::output::OutputTupleError;
use crate::storage::StorageError;
use crate::tree::node::TreeIndex;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("output tuple failed validation: {0}")]
    InvalidOutput(#[from] OutputTupleError),
    #[error("tree is at capacity for its configured max_depth")]
    TreeFull,
    #[error("leaf index {0} is out of range (output_count = {1})")]
    OutOfRange(u64, u64),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("integrity check failed at {0:?}: {1}")]
    IntegrityFailure(TreeIndex, String),
    #[error("tree is in a fatal state after a prior integrity failure; call rebuild() first")]
    Fatal,
    #[error("rebuild aborted: {0}")]
    RebuildFailed(String),
    #[error("stored schema version {0} is not supported (expected {1})")]
    SchemaVersionMismatch(u8, u8),
    #[error("stored root checkpoint is corrupt: {0}")]
    CorruptCheckpoint(String),
    #[error("malformed branch at layer {0}: expected {1} sibling scalars, got {2}")]
    MalformedBranch(usize, usize, usize),
}

pub type TreeResult<T> = Result<T, TreeError>;
