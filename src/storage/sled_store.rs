//! Durable, embedded [`Storage`] implementation backed by `sled`.
//!
//! `sled` gives ordered iteration and atomic batch writes over a
//! single tree of bytes, which is exactly what the namespaced key
//! layout here needs: nodes, outputs, and metadata share one
//! `sled::Db` and are distinguished by their key tag (`'N'`, `'O'`,
//! `'M'`).

use std::path::Path;
use std::sync::Mutex;

use sled::{Batch, Db};

use super::traits::{
    decode_node_value, decode_output_value, encode_metadata_key, encode_node_key,
    encode_node_value, encode_output_key, pending_metadata, pending_node, pending_output,
    pending_output_count, PendingWrite, Storage, StorageError, StorageResult,
};
use crate::output::OutputTuple;
use crate::tree::node::{TreeIndex, TreeNode};

const OUTPUT_COUNT_KEY: &str = "__output_count";

/// Durable key-value storage at a filesystem path, reopened across
/// restarts without needing a rebuild (`save`/`load` still checkpoint
/// depth/root on top of this).
pub struct SledStorage {
    db: Db,
    /// Buffered mutations for the currently open batch, if any.
    batch: Mutex<Option<Vec<PendingWrite>>>,
}

impl SledStorage {
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = sled::open(path).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self {
            db,
            batch: Mutex::new(None),
        })
    }

    fn poisoned() -> StorageError {
        StorageError::Backend("batch mutex poisoned".to_string())
    }

    fn cached_output_count(&self) -> StorageResult<u64> {
        match self
            .db
            .get(encode_metadata_key(OUTPUT_COUNT_KEY))
            .map_err(|e| StorageError::Backend(e.to_string()))?
        {
            Some(bytes) => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                Ok(u64::from_le_bytes(buf))
            }
            None => Ok(0),
        }
    }

    fn set_cached_output_count(&self, count: u64) -> StorageResult<()> {
        self.db
            .insert(encode_metadata_key(OUTPUT_COUNT_KEY), &count.to_le_bytes())
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    fn apply_immediately(&self, write: PendingWrite) -> StorageResult<()> {
        match write {
            PendingWrite::Node(index, node) => {
                self.db
                    .insert(&encode_node_key(index)[..], &encode_node_value(&node)[..])
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }
            PendingWrite::DeleteNode(index) => {
                self.db
                    .remove(&encode_node_key(index)[..])
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }
            PendingWrite::Output(index, tuple) => {
                self.db
                    .insert(&encode_output_key(index)[..], &tuple.serialize()[..])
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                let current = self.cached_output_count()?;
                if index >= current {
                    self.set_cached_output_count(index + 1)?;
                }
            }
            PendingWrite::Metadata(key, bytes) => {
                self.db
                    .insert(encode_metadata_key(&key), bytes)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn record(&self, write: PendingWrite) -> StorageResult<()> {
        let mut guard = self.batch.lock().map_err(|_| Self::poisoned())?;
        if let Some(buffered) = guard.as_mut() {
            buffered.push(write);
            Ok(())
        } else {
            drop(guard);
            self.apply_immediately(write)
        }
    }
}

impl Storage for SledStorage {
    fn store_node(&self, index: TreeIndex, node: TreeNode) -> StorageResult<()> {
        self.record(PendingWrite::Node(index, node))
    }

    fn get_node(&self, index: TreeIndex) -> StorageResult<Option<TreeNode>> {
        {
            let guard = self.batch.lock().map_err(|_| Self::poisoned())?;
            if let Some(batch) = guard.as_ref() {
                if let Some(pending) = pending_node(batch, index) {
                    return Ok(pending);
                }
            }
        }
        match self
            .db
            .get(encode_node_key(index))
            .map_err(|e| StorageError::Backend(e.to_string()))?
        {
            Some(bytes) => Ok(Some(decode_node_value(&bytes, index)?)),
            None => Ok(None),
        }
    }

    fn delete_node(&self, index: TreeIndex) -> StorageResult<bool> {
        let existed = {
            let guard = self.batch.lock().map_err(|_| Self::poisoned())?;
            match guard.as_ref().and_then(|batch| pending_node(batch, index)) {
                Some(pending) => pending.is_some(),
                None => self
                    .db
                    .contains_key(encode_node_key(index))
                    .map_err(|e| StorageError::Backend(e.to_string()))?,
            }
        };
        self.record(PendingWrite::DeleteNode(index))?;
        Ok(existed)
    }

    fn store_output(&self, index: u64, tuple: OutputTuple) -> StorageResult<()> {
        self.record(PendingWrite::Output(index, tuple))
    }

    fn get_output(&self, index: u64) -> StorageResult<Option<OutputTuple>> {
        {
            let guard = self.batch.lock().map_err(|_| Self::poisoned())?;
            if let Some(batch) = guard.as_ref() {
                if let Some(pending) = pending_output(batch, index) {
                    return Ok(Some(pending));
                }
            }
        }
        match self
            .db
            .get(encode_output_key(index))
            .map_err(|e| StorageError::Backend(e.to_string()))?
        {
            Some(bytes) => Ok(Some(decode_output_value(&bytes, index)?)),
            None => Ok(None),
        }
    }

    fn store_metadata(&self, key: &str, bytes: Vec<u8>) -> StorageResult<()> {
        self.record(PendingWrite::Metadata(key.to_string(), bytes))
    }

    fn get_metadata(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        {
            let guard = self.batch.lock().map_err(|_| Self::poisoned())?;
            if let Some(batch) = guard.as_ref() {
                if let Some(pending) = pending_metadata(batch, key) {
                    return Ok(Some(pending.clone()));
                }
            }
        }
        Ok(self
            .db
            .get(encode_metadata_key(key))
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .map(|bytes| bytes.to_vec()))
    }

    fn begin_batch(&self) -> StorageResult<()> {
        let mut guard = self.batch.lock().map_err(|_| Self::poisoned())?;
        if guard.is_some() {
            return Err(StorageError::BatchConflict);
        }
        *guard = Some(Vec::new());
        Ok(())
    }

    fn commit_batch(&self) -> StorageResult<()> {
        let pending = {
            let mut guard = self.batch.lock().map_err(|_| Self::poisoned())?;
            guard.take().ok_or(StorageError::NoBatchOpen)?
        };

        let mut sled_batch = Batch::default();
        let mut count_delta: Option<u64> = None;
        for write in &pending {
            match write {
                PendingWrite::Node(index, node) => {
                    sled_batch.insert(&encode_node_key(*index)[..], &encode_node_value(node)[..]);
                }
                PendingWrite::DeleteNode(index) => {
                    sled_batch.remove(&encode_node_key(*index)[..]);
                }
                PendingWrite::Output(index, tuple) => {
                    sled_batch.insert(&encode_output_key(*index)[..], &tuple.serialize()[..]);
                    count_delta = Some(count_delta.map_or(*index + 1, |c| c.max(*index + 1)));
                }
                PendingWrite::Metadata(key, bytes) => {
                    sled_batch.insert(encode_metadata_key(key), bytes.clone());
                }
            }
        }
        if let Some(new_count) = count_delta {
            let current = self.cached_output_count()?;
            if new_count > current {
                sled_batch.insert(encode_metadata_key(OUTPUT_COUNT_KEY), &new_count.to_le_bytes());
            }
        }
        self.db
            .apply_batch(sled_batch)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    fn abort_batch(&self) -> StorageResult<()> {
        let mut guard = self.batch.lock().map_err(|_| Self::poisoned())?;
        guard.take().ok_or(StorageError::NoBatchOpen)?;
        Ok(())
    }

    fn get_output_count(&self) -> StorageResult<u64> {
        let committed = self.cached_output_count()?;
        let guard = self.batch.lock().map_err(|_| Self::poisoned())?;
        match guard.as_ref().and_then(|batch| pending_output_count(batch)) {
            Some(pending) => Ok(pending.max(committed)),
            None => Ok(committed),
        }
    }

    fn sync(&self) -> StorageResult<bool> {
        self.db
            .flush()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(true)
    }
}

impl Drop for SledStorage {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.batch.lock() {
            // A batch left open at shutdown MUST be aborted, not committed.
            guard.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Point;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, SledStorage) {
        let dir = TempDir::new().expect("tempdir");
        let storage = SledStorage::open(dir.path()).expect("open sled");
        (dir, storage)
    }

    #[test]
    fn store_and_get_output_round_trips() {
        let (_dir, storage) = open_temp();
        let tuple = OutputTuple::new(
            Point::hash_to_point(b"a"),
            Point::hash_to_point(b"b"),
            Point::hash_to_point(b"c"),
        );
        storage.store_output(0, tuple).unwrap();
        assert_eq!(storage.get_output(0).unwrap(), Some(tuple));
        assert_eq!(storage.get_output_count().unwrap(), 1);
    }

    #[test]
    fn reopening_the_same_path_preserves_data() {
        let dir = TempDir::new().expect("tempdir");
        let tuple = OutputTuple::new(
            Point::hash_to_point(b"a"),
            Point::hash_to_point(b"b"),
            Point::hash_to_point(b"c"),
        );
        {
            let storage = SledStorage::open(dir.path()).expect("open sled");
            storage.store_output(0, tuple).unwrap();
            storage.sync().unwrap();
        }
        {
            let storage = SledStorage::open(dir.path()).expect("reopen sled");
            assert_eq!(storage.get_output(0).unwrap(), Some(tuple));
            assert_eq!(storage.get_output_count().unwrap(), 1);
        }
    }

    #[test]
    fn batch_writes_are_visible_to_reads_on_the_same_handle() {
        let (_dir, storage) = open_temp();
        let idx = TreeIndex::new(0, 0);
        let node = TreeNode::new(Point::hash_to_point(b"node"), 1);
        storage.begin_batch().unwrap();
        storage.store_node(idx, node).unwrap();
        // Read-your-writes: visible while the batch is still open.
        assert_eq!(storage.get_node(idx).unwrap(), Some(node));
        storage.commit_batch().unwrap();
        assert_eq!(storage.get_node(idx).unwrap(), Some(node));
    }

    #[test]
    fn batch_is_discarded_on_abort() {
        let (_dir, storage) = open_temp();
        let idx = TreeIndex::new(0, 0);
        let node = TreeNode::new(Point::hash_to_point(b"node"), 1);
        storage.begin_batch().unwrap();
        storage.store_node(idx, node).unwrap();
        assert_eq!(storage.get_node(idx).unwrap(), Some(node));
        storage.abort_batch().unwrap();
        assert_eq!(storage.get_node(idx).unwrap(), None);
    }
}
