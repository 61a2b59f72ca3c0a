//! Storage trait definition, key layout, and shared error type.
//!
//! Implementations: [`crate::storage::memory::MemoryStorage`] (volatile,
//! for tests) and [`crate::storage::sled_store::SledStorage`] (durable,
//! embedded). The key/value byte layout here is the on-disk
//! compatibility contract and MUST stay bit-exact across
//! implementations.

use thiserror::Error;

use crate::group::{GroupError, Point};
use crate::output::{OutputTuple, OutputTupleError};
use crate::tree::node::{TreeIndex, TreeNode};

/// Errors surfaced by a `Storage` implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("backing store error: {0}")]
    Backend(String),
    #[error("a batch is already open on this storage handle")]
    BatchConflict,
    #[error("no batch is open on this storage handle")]
    NoBatchOpen,
    #[error("corrupt node record at {0:?}: {1}")]
    CorruptNode(TreeIndex, String),
    #[error("corrupt output record at index {0}: {1}")]
    CorruptOutput(u64, OutputTupleError),
}

impl From<GroupError> for StorageError {
    fn from(err: GroupError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

const NODE_KEY_TAG: u8 = b'N';
const OUTPUT_KEY_TAG: u8 = b'O';
const METADATA_KEY_TAG: u8 = b'M';

/// 40-byte on-disk node value: 32-byte point || 8-byte child_count (LE).
pub const NODE_VALUE_SIZE: usize = 40;

/// Encodes a node key: `'N' || layer_be_u32 || index_be_u64` (13 bytes).
pub fn encode_node_key(index: TreeIndex) -> [u8; 13] {
    let mut key = [0u8; 13];
    key[0] = NODE_KEY_TAG;
    key[1..5].copy_from_slice(&index.layer.to_be_bytes());
    key[5..13].copy_from_slice(&index.index.to_be_bytes());
    key
}

/// Encodes an output key: `'O' || index_be_u64` (9 bytes).
pub fn encode_output_key(index: u64) -> [u8; 9] {
    let mut key = [0u8; 9];
    key[0] = OUTPUT_KEY_TAG;
    key[1..9].copy_from_slice(&index.to_be_bytes());
    key
}

/// Encodes a metadata key: `'M' || ascii_key`.
pub fn encode_metadata_key(key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + key.len());
    out.push(METADATA_KEY_TAG);
    out.extend_from_slice(key.as_bytes());
    out
}

/// Encodes a `TreeNode` as its 40-byte on-disk value.
pub fn encode_node_value(node: &TreeNode) -> [u8; NODE_VALUE_SIZE] {
    let mut value = [0u8; NODE_VALUE_SIZE];
    value[0..32].copy_from_slice(&node.hash.to_bytes());
    value[32..40].copy_from_slice(&node.child_count.to_le_bytes());
    value
}

/// Decodes a 40-byte on-disk node value.
pub fn decode_node_value(bytes: &[u8], index: TreeIndex) -> StorageResult<TreeNode> {
    if bytes.len() != NODE_VALUE_SIZE {
        return Err(StorageError::CorruptNode(
            index,
            format!("expected {NODE_VALUE_SIZE} bytes, got {}", bytes.len()),
        ));
    }
    let mut point_bytes = [0u8; 32];
    point_bytes.copy_from_slice(&bytes[0..32]);
    let hash = Point::from_canonical_bytes(&point_bytes)
        .map_err(|e| StorageError::CorruptNode(index, e.to_string()))?;

    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[32..40]);
    let child_count = u64::from_le_bytes(count_bytes);

    Ok(TreeNode { hash, child_count })
}

/// Decodes a 96-byte output value.
pub fn decode_output_value(bytes: &[u8], index: u64) -> StorageResult<OutputTuple> {
    OutputTuple::deserialize(bytes).map_err(|e| StorageError::CorruptOutput(index, e))
}

/// A buffered mutation inside an open batch, applied atomically on
/// commit and discarded on abort.
#[derive(Debug, Clone)]
pub(crate) enum PendingWrite {
    Node(TreeIndex, TreeNode),
    DeleteNode(TreeIndex),
    Output(u64, OutputTuple),
    Metadata(String, Vec<u8>),
}

/// Scans an open batch's buffered writes for the most recent entry
/// touching `index`, giving callers read-your-writes visibility into
/// their own uncommitted batch. `Some(None)` means the index was
/// buffered for deletion; `None` means the batch has no opinion on
/// `index` and the caller should fall back to committed state.
pub(crate) fn pending_node(batch: &[PendingWrite], index: TreeIndex) -> Option<Option<TreeNode>> {
    batch.iter().rev().find_map(|write| match write {
        PendingWrite::Node(idx, node) if *idx == index => Some(Some(*node)),
        PendingWrite::DeleteNode(idx) if *idx == index => Some(None),
        _ => None,
    })
}

pub(crate) fn pending_output(batch: &[PendingWrite], index: u64) -> Option<OutputTuple> {
    batch.iter().rev().find_map(|write| match write {
        PendingWrite::Output(idx, tuple) if *idx == index => Some(*tuple),
        _ => None,
    })
}

pub(crate) fn pending_metadata<'a>(batch: &'a [PendingWrite], key: &str) -> Option<&'a Vec<u8>> {
    batch.iter().rev().find_map(|write| match write {
        PendingWrite::Metadata(k, bytes) if k == key => Some(bytes),
        _ => None,
    })
}

/// Highest `index + 1` among buffered `Output` writes, if any — used to
/// make `get_output_count` see its own batch's pending inserts.
pub(crate) fn pending_output_count(batch: &[PendingWrite]) -> Option<u64> {
    batch
        .iter()
        .filter_map(|write| match write {
            PendingWrite::Output(idx, _) => Some(*idx + 1),
            _ => None,
        })
        .max()
}

/// A transactional, namespaced key-value layer that backs a
/// [`crate::tree::CurveTree`].
///
/// Three name-spaces — nodes, outputs, metadata — sharing one handle
/// and one internal mutex. At most one batch is open at a time per
/// handle; mutations inside a batch are buffered and applied
/// atomically on `commit_batch`, discarded on `abort_batch`.
pub trait Storage: Send + Sync {
    fn store_node(&self, index: TreeIndex, node: TreeNode) -> StorageResult<()>;
    fn get_node(&self, index: TreeIndex) -> StorageResult<Option<TreeNode>>;
    fn delete_node(&self, index: TreeIndex) -> StorageResult<bool>;

    fn store_output(&self, index: u64, tuple: OutputTuple) -> StorageResult<()>;
    fn get_output(&self, index: u64) -> StorageResult<Option<OutputTuple>>;

    fn store_metadata(&self, key: &str, bytes: Vec<u8>) -> StorageResult<()>;
    fn get_metadata(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Opens a batch scope. Fails with `BatchConflict` if one is already
    /// open on this handle.
    fn begin_batch(&self) -> StorageResult<()>;
    /// Atomically applies every mutation buffered since `begin_batch`.
    fn commit_batch(&self) -> StorageResult<()>;
    /// Discards every mutation buffered since `begin_batch`.
    fn abort_batch(&self) -> StorageResult<()>;

    /// Count of stored leaves. Implementations may cache this; the cache
    /// is invalidated by any output store.
    fn get_output_count(&self) -> StorageResult<u64>;

    /// Forces durability of all previously-committed writes.
    fn sync(&self) -> StorageResult<bool>;
}

/// Which concrete [`Storage`] backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Volatile, `HashMap`-backed. Used in tests and by the CLI's
    /// `--memory` mode.
    Memory,
    /// Durable, embedded, ordered-iteration key-value store.
    Sled,
}
