//! Volatile, `HashMap`/`BTreeMap`-backed [`Storage`] implementation.
//!
//! Used by tests and by the CLI's `--memory` mode. Every operation
//! serializes on one `Mutex`: multiple threads may share a handle, but
//! at most one mutation is in flight at a time.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::traits::{
    pending_metadata, pending_node, pending_output, pending_output_count, PendingWrite, Storage,
    StorageError, StorageResult,
};
use crate::output::OutputTuple;
use crate::tree::node::{TreeIndex, TreeNode};

#[derive(Default)]
struct MemoryState {
    nodes: BTreeMap<TreeIndex, TreeNode>,
    outputs: BTreeMap<u64, OutputTuple>,
    metadata: HashMap<String, Vec<u8>>,
    /// `Some` while a batch is open; buffers mutations until commit.
    batch: Option<Vec<PendingWrite>>,
}

/// In-memory [`Storage`]. Data is lost when the handle is dropped.
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn poisoned() -> StorageError {
        StorageError::Backend("storage mutex poisoned".to_string())
    }

    /// Buffers a write if a batch is open, otherwise applies it
    /// immediately. Returns whether it was buffered.
    fn record(&self, write: PendingWrite) -> StorageResult<bool> {
        let mut state = self.state.lock().map_err(|_| Self::poisoned())?;
        if let Some(batch) = state.batch.as_mut() {
            batch.push(write);
            Ok(true)
        } else {
            Self::apply(&mut state, write);
            Ok(false)
        }
    }

    fn apply(state: &mut MemoryState, write: PendingWrite) {
        match write {
            PendingWrite::Node(index, node) => {
                state.nodes.insert(index, node);
            }
            PendingWrite::DeleteNode(index) => {
                state.nodes.remove(&index);
            }
            PendingWrite::Output(index, tuple) => {
                state.outputs.insert(index, tuple);
            }
            PendingWrite::Metadata(key, bytes) => {
                state.metadata.insert(key, bytes);
            }
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn store_node(&self, index: TreeIndex, node: TreeNode) -> StorageResult<()> {
        self.record(PendingWrite::Node(index, node))?;
        Ok(())
    }

    fn get_node(&self, index: TreeIndex) -> StorageResult<Option<TreeNode>> {
        let state = self.state.lock().map_err(|_| Self::poisoned())?;
        if let Some(batch) = state.batch.as_ref() {
            if let Some(pending) = pending_node(batch, index) {
                return Ok(pending);
            }
        }
        Ok(state.nodes.get(&index).copied())
    }

    fn delete_node(&self, index: TreeIndex) -> StorageResult<bool> {
        let mut state = self.state.lock().map_err(|_| Self::poisoned())?;
        if state.batch.is_some() {
            let existed = match pending_node(state.batch.as_ref().expect("checked is_some"), index) {
                Some(pending) => pending.is_some(),
                None => state.nodes.contains_key(&index),
            };
            state.batch.as_mut().expect("checked is_some").push(PendingWrite::DeleteNode(index));
            return Ok(existed);
        }
        Ok(state.nodes.remove(&index).is_some())
    }

    fn store_output(&self, index: u64, tuple: OutputTuple) -> StorageResult<()> {
        self.record(PendingWrite::Output(index, tuple))?;
        Ok(())
    }

    fn get_output(&self, index: u64) -> StorageResult<Option<OutputTuple>> {
        let state = self.state.lock().map_err(|_| Self::poisoned())?;
        if let Some(batch) = state.batch.as_ref() {
            if let Some(pending) = pending_output(batch, index) {
                return Ok(Some(pending));
            }
        }
        Ok(state.outputs.get(&index).copied())
    }

    fn store_metadata(&self, key: &str, bytes: Vec<u8>) -> StorageResult<()> {
        self.record(PendingWrite::Metadata(key.to_string(), bytes))?;
        Ok(())
    }

    fn get_metadata(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let state = self.state.lock().map_err(|_| Self::poisoned())?;
        if let Some(batch) = state.batch.as_ref() {
            if let Some(pending) = pending_metadata(batch, key) {
                return Ok(Some(pending.clone()));
            }
        }
        Ok(state.metadata.get(key).cloned())
    }

    fn begin_batch(&self) -> StorageResult<()> {
        let mut state = self.state.lock().map_err(|_| Self::poisoned())?;
        if state.batch.is_some() {
            return Err(StorageError::BatchConflict);
        }
        state.batch = Some(Vec::new());
        Ok(())
    }

    fn commit_batch(&self) -> StorageResult<()> {
        let mut state = self.state.lock().map_err(|_| Self::poisoned())?;
        let pending = state.batch.take().ok_or(StorageError::NoBatchOpen)?;
        for write in pending {
            Self::apply(&mut state, write);
        }
        Ok(())
    }

    fn abort_batch(&self) -> StorageResult<()> {
        let mut state = self.state.lock().map_err(|_| Self::poisoned())?;
        state.batch.take().ok_or(StorageError::NoBatchOpen)?;
        Ok(())
    }

    fn get_output_count(&self) -> StorageResult<u64> {
        let state = self.state.lock().map_err(|_| Self::poisoned())?;
        let committed = state.outputs.len() as u64;
        match state.batch.as_ref().and_then(|b| pending_output_count(b)) {
            Some(pending) => Ok(pending.max(committed)),
            None => Ok(committed),
        }
    }

    fn sync(&self) -> StorageResult<bool> {
        // Nothing to flush: the backing store is volatile by design.
        Ok(true)
    }
}

impl Drop for MemoryStorage {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            // A batch left open at shutdown MUST be aborted, not committed.
            state.batch.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Point;

    fn sample_node() -> TreeNode {
        TreeNode::new(Point::hash_to_point(b"node"), 1)
    }

    #[test]
    fn store_and_get_node_round_trips() {
        let storage = MemoryStorage::new();
        let idx = TreeIndex::new(0, 0);
        storage.store_node(idx, sample_node()).unwrap();
        assert_eq!(storage.get_node(idx).unwrap(), Some(sample_node()));
    }

    #[test]
    fn missing_node_is_none() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_node(TreeIndex::new(0, 0)).unwrap(), None);
    }

    #[test]
    fn delete_node_reports_existence() {
        let storage = MemoryStorage::new();
        let idx = TreeIndex::new(0, 0);
        assert!(!storage.delete_node(idx).unwrap());
        storage.store_node(idx, sample_node()).unwrap();
        assert!(storage.delete_node(idx).unwrap());
        assert_eq!(storage.get_node(idx).unwrap(), None);
    }

    #[test]
    fn batch_writes_are_visible_to_reads_on_the_same_handle() {
        let storage = MemoryStorage::new();
        let idx = TreeIndex::new(0, 0);
        storage.begin_batch().unwrap();
        storage.store_node(idx, sample_node()).unwrap();
        // Read-your-writes: visible while the batch is still open.
        assert_eq!(storage.get_node(idx).unwrap(), Some(sample_node()));
        storage.commit_batch().unwrap();
        assert_eq!(storage.get_node(idx).unwrap(), Some(sample_node()));
    }

    #[test]
    fn later_pending_write_shadows_an_earlier_one_in_the_same_batch() {
        let storage = MemoryStorage::new();
        let idx = TreeIndex::new(0, 0);
        let other = TreeNode::new(Point::hash_to_point(b"other"), 2);
        storage.begin_batch().unwrap();
        storage.store_node(idx, sample_node()).unwrap();
        storage.store_node(idx, other).unwrap();
        assert_eq!(storage.get_node(idx).unwrap(), Some(other));
        storage.commit_batch().unwrap();
        assert_eq!(storage.get_node(idx).unwrap(), Some(other));
    }

    #[test]
    fn pending_delete_shadows_an_earlier_write_in_the_same_batch() {
        let storage = MemoryStorage::new();
        let idx = TreeIndex::new(0, 0);
        storage.store_node(idx, sample_node()).unwrap();
        storage.begin_batch().unwrap();
        assert!(storage.delete_node(idx).unwrap());
        assert_eq!(storage.get_node(idx).unwrap(), None);
        storage.commit_batch().unwrap();
        assert_eq!(storage.get_node(idx).unwrap(), None);
    }

    #[test]
    fn batch_is_discarded_on_abort() {
        let storage = MemoryStorage::new();
        let idx = TreeIndex::new(0, 0);
        storage.begin_batch().unwrap();
        storage.store_node(idx, sample_node()).unwrap();
        assert_eq!(storage.get_node(idx).unwrap(), Some(sample_node()));
        storage.abort_batch().unwrap();
        assert_eq!(storage.get_node(idx).unwrap(), None);
    }

    #[test]
    fn only_one_batch_at_a_time() {
        let storage = MemoryStorage::new();
        storage.begin_batch().unwrap();
        assert!(matches!(storage.begin_batch(), Err(StorageError::BatchConflict)));
    }

    #[test]
    fn output_count_reflects_stores() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_output_count().unwrap(), 0);
        let tuple = OutputTuple::new(
            Point::hash_to_point(b"a"),
            Point::hash_to_point(b"b"),
            Point::hash_to_point(b"c"),
        );
        storage.store_output(0, tuple).unwrap();
        assert_eq!(storage.get_output_count().unwrap(), 1);
    }

    #[test]
    fn output_count_sees_pending_batch_writes() {
        let storage = MemoryStorage::new();
        let tuple = OutputTuple::new(
            Point::hash_to_point(b"a"),
            Point::hash_to_point(b"b"),
            Point::hash_to_point(b"c"),
        );
        storage.begin_batch().unwrap();
        storage.store_output(0, tuple).unwrap();
        assert_eq!(storage.get_output_count().unwrap(), 1);
        storage.commit_batch().unwrap();
        assert_eq!(storage.get_output_count().unwrap(), 1);
    }
}
