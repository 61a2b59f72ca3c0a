//! Bulk-loading helper for populating a fresh [`CurveTree`].
//!
//! Buffers pushed outputs in memory (`Buffering`) and only touches
//! storage once [`CurveTreeBuilder::finalize`] commits them in batches,
//! handing back an `Active` tree. Used by the CLI's bulk-import path and
//! by anything restoring a tree from an exported output stream.

use std::sync::Arc;

use crate::output::OutputTuple;
use crate::storage::Storage;
use crate::tree::config::TreeConfig;
use crate::tree::curve_tree::CurveTree;
use crate::tree::error::TreeResult;

const DEFAULT_BATCH_SIZE: usize = 256;

pub struct CurveTreeBuilder {
    storage: Arc<dyn Storage>,
    config: TreeConfig,
    batch_size: usize,
    pending: Vec<OutputTuple>,
    progress: Option<Box<dyn FnMut(u64, u64) + Send>>,
}

impl CurveTreeBuilder {
    pub fn new(storage: Arc<dyn Storage>, config: TreeConfig) -> Self {
        Self {
            storage,
            config,
            batch_size: DEFAULT_BATCH_SIZE,
            pending: Vec::new(),
            progress: None,
        }
    }

    /// Number of outputs committed per `add_outputs` batch during
    /// `finalize`. Clamped to at least 1.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Invoked after each batch commits, with `(processed, total)` —
    /// the cumulative count of outputs committed so far and the total
    /// pending at the time `finalize` was called.
    pub fn on_progress(mut self, callback: impl FnMut(u64, u64) + Send + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn push(&mut self, tuple: OutputTuple) {
        self.pending.push(tuple);
    }

    pub fn extend(&mut self, tuples: impl IntoIterator<Item = OutputTuple>) {
        self.pending.extend(tuples);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Commits every buffered output, in order, and returns the
    /// resulting tree.
    pub fn finalize(mut self) -> TreeResult<CurveTree> {
        let tree = CurveTree::new(self.storage.clone(), self.config);
        let pending = std::mem::take(&mut self.pending);
        let total = pending.len() as u64;
        let mut committed = 0u64;
        for chunk in pending.chunks(self.batch_size) {
            tree.add_outputs(chunk)?;
            committed += chunk.len() as u64;
            if let Some(callback) = self.progress.as_mut() {
                callback(committed, total);
            }
        }
        Ok(tree)
    }
}
